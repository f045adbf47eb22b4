use crate::error::StudioError;
use crate::logw;
use crate::production::ProductionState;
use crate::scene::{Scene, WordTiming};
use std::time::Duration;

/// Music bed level between scenes.
pub const MUSIC_BED_LEVEL: f32 = 0.3;
/// Music level while narration is speaking.
pub const MUSIC_DUCKED_LEVEL: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Playing { scene: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    SceneStarted { scene: usize },
    Caption { scene: usize, word: usize },
    SceneFinished { scene: usize },
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Playing,
    Finished,
    Failed,
}

/// Exclusive owner of the narration output device. Starting a scene must
/// stop whatever was playing before.
pub trait NarrationSink {
    fn start(&mut self, scene: &Scene) -> Result<(), StudioError>;
    fn elapsed(&self) -> Duration;
    fn duration(&self) -> Option<Duration>;
    fn status(&self) -> SinkStatus;
    fn stop(&mut self);
}

pub trait MusicBed {
    fn set_level(&mut self, level: f32);
    fn stop(&mut self);
}

/// Sequential scene playback with word-level caption sync.
///
/// Driven by an abstract scheduler tick; the host loop calls [`tick`] on its
/// frame cadence and renders the returned events. Advancing to the next
/// scene happens strictly after narration ends — success and playback error
/// both advance, never stall.
///
/// [`tick`]: PlaybackSynchronizer::tick
pub struct PlaybackSynchronizer<S: NarrationSink, M: MusicBed> {
    state: ProductionState,
    sink: S,
    music: M,
    phase: PlaybackPhase,
    /// Active scene's caption track; synthesized when the provider sent none.
    timings: Vec<WordTiming>,
    last_word: Option<usize>,
}

impl<S: NarrationSink, M: MusicBed> PlaybackSynchronizer<S, M> {
    pub fn new(state: ProductionState, sink: S, music: M) -> Self {
        PlaybackSynchronizer {
            state,
            sink,
            music,
            phase: PlaybackPhase::Idle,
            timings: Vec::new(),
            last_word: None,
        }
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    /// Start sequential playback from the first scene.
    pub fn play(&mut self) -> Vec<PlaybackEvent> {
        self.stop();
        self.music.set_level(MUSIC_BED_LEVEL);
        self.begin_scene(0)
    }

    /// Release narration and music immediately. Idempotent from any state.
    pub fn stop(&mut self) {
        self.sink.stop();
        self.music.stop();
        self.phase = PlaybackPhase::Idle;
        self.timings.clear();
        self.last_word = None;
    }

    /// One scheduler tick: emit caption updates while narration plays,
    /// advance when it ends.
    pub fn tick(&mut self) -> Vec<PlaybackEvent> {
        let PlaybackPhase::Playing { scene } = self.phase else {
            return Vec::new();
        };

        match self.sink.status() {
            SinkStatus::Playing => {
                let elapsed_ms = self.sink.elapsed().as_millis() as u64;
                if let Some(word) = word_index_at(&self.timings, elapsed_ms) {
                    if self.last_word != Some(word) {
                        self.last_word = Some(word);
                        return vec![PlaybackEvent::Caption { scene, word }];
                    }
                }
                Vec::new()
            }
            SinkStatus::Finished | SinkStatus::Failed => {
                self.music.set_level(MUSIC_BED_LEVEL);
                let mut events = vec![PlaybackEvent::SceneFinished { scene }];
                events.extend(self.begin_scene(scene + 1));
                events
            }
        }
    }

    fn begin_scene(&mut self, start: usize) -> Vec<PlaybackEvent> {
        let mut events = Vec::new();
        let snapshot = self.state.snapshot();
        let mut index = start;

        loop {
            if index >= snapshot.scenes.len() {
                self.sink.stop();
                self.music.stop();
                self.phase = PlaybackPhase::Idle;
                self.timings.clear();
                self.last_word = None;
                events.push(PlaybackEvent::Finished);
                return events;
            }

            let scene = &snapshot.scenes[index];
            self.music.set_level(MUSIC_DUCKED_LEVEL);
            match self.sink.start(scene) {
                Ok(()) => {
                    self.timings = caption_track(scene, self.sink.duration());
                    self.last_word = None;
                    self.phase = PlaybackPhase::Playing { scene: index };
                    events.push(PlaybackEvent::SceneStarted { scene: index });
                    return events;
                }
                Err(err) => {
                    logw(format!(
                        "scene {}: narration start failed: {err}",
                        index + 1
                    ));
                    events.push(PlaybackEvent::SceneFinished { scene: index });
                    index += 1;
                }
            }
        }
    }
}

/// The word whose onset <= elapsed < next onset. `None` before the first
/// onset or when no track exists.
pub fn word_index_at(timings: &[WordTiming], elapsed_ms: u64) -> Option<usize> {
    let bucket = timings.partition_point(|t| t.onset_ms <= elapsed_ms);
    if bucket == 0 {
        None
    } else {
        Some(timings[bucket - 1].index)
    }
}

/// Provider timings when present, otherwise evenly spaced boundaries derived
/// from narration duration and word count.
fn caption_track(scene: &Scene, duration: Option<Duration>) -> Vec<WordTiming> {
    if let Some(timings) = &scene.word_timings {
        if !timings.is_empty() {
            return timings.clone();
        }
    }

    let words = scene.word_count();
    let Some(duration) = duration else {
        return Vec::new();
    };
    if words == 0 {
        return Vec::new();
    }

    let total_ms = duration.as_millis() as u64;
    (0..words)
        .map(|index| WordTiming {
            index,
            onset_ms: total_ms * index as u64 / words as u64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{NarrationAsset, SceneScript, Topic};
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeSink {
        now: Duration,
        total: Option<Duration>,
        playing: bool,
        fail_scenes: Vec<usize>,
        failed: bool,
        started: Vec<usize>,
        stops: usize,
    }

    impl FakeSink {
        fn advance(&mut self, ms: u64) {
            self.now += Duration::from_millis(ms);
            if let Some(total) = self.total {
                if self.now >= total {
                    self.playing = false;
                }
            }
        }
    }

    impl NarrationSink for FakeSink {
        fn start(&mut self, scene: &Scene) -> Result<(), StudioError> {
            self.stop();
            if self.fail_scenes.contains(&scene.index) {
                return Err(StudioError::Synthesis("device refused".into()));
            }
            self.started.push(scene.index);
            self.playing = true;
            self.failed = false;
            self.now = Duration::ZERO;
            Ok(())
        }

        fn elapsed(&self) -> Duration {
            self.now
        }

        fn duration(&self) -> Option<Duration> {
            self.total
        }

        fn status(&self) -> SinkStatus {
            if self.failed {
                SinkStatus::Failed
            } else if self.playing {
                SinkStatus::Playing
            } else {
                SinkStatus::Finished
            }
        }

        fn stop(&mut self) {
            self.playing = false;
            self.stops += 1;
        }
    }

    #[derive(Clone, Default)]
    struct FakeMusic {
        level: Rc<Cell<f32>>,
        stopped: Rc<Cell<bool>>,
    }

    impl MusicBed for FakeMusic {
        fn set_level(&mut self, level: f32) {
            self.level.set(level);
            self.stopped.set(false);
        }

        fn stop(&mut self) {
            self.stopped.set(true);
        }
    }

    fn timings(words: usize, total_ms: u64) -> Vec<WordTiming> {
        (0..words)
            .map(|index| WordTiming {
                index,
                onset_ms: total_ms * index as u64 / words as u64,
            })
            .collect()
    }

    fn seeded_state(scripts: &[(&str, Option<Vec<WordTiming>>)]) -> ProductionState {
        let state = ProductionState::new();
        let stamp = state.begin(Topic::default());
        for (i, (narration, word_timings)) in scripts.iter().enumerate() {
            let mut scene = Scene::from_script(
                i,
                SceneScript {
                    narration: (*narration).to_string(),
                    image_prompt: String::new(),
                    stock_query: String::new(),
                    camera_angle: String::new(),
                    mood: String::new(),
                },
            );
            scene.narration_audio = Some(NarrationAsset::Deferred {
                voice: "v".into(),
            });
            scene.word_timings = word_timings.clone();
            scene.narration_ready = true;
            state.append_scene(stamp, scene);
        }
        state
    }

    #[test]
    fn word_lookup_buckets_are_half_open() {
        let track = timings(18, 4200);
        // 18 words over [0, 4200): word 9 spans [2100, 2333).
        assert_eq!(word_index_at(&track, 2100), Some(9));
        assert_eq!(word_index_at(&track, 2099), Some(8));
        assert_eq!(word_index_at(&track, 0), Some(0));
        assert_eq!(word_index_at(&track, 999_999), Some(17));
        assert_eq!(word_index_at(&[], 100), None);
    }

    #[test]
    fn word_lookup_is_monotonic_in_elapsed_time() {
        let track = timings(18, 4200);
        let mut last = None;
        for elapsed in (0..4400).step_by(16) {
            let word = word_index_at(&track, elapsed);
            assert!(word >= last, "regressed at {elapsed}ms");
            last = word;
        }
    }

    #[test]
    fn captions_emit_once_per_word_change() {
        let state = seeded_state(&[("one two three", Some(timings(3, 3000)))]);
        let mut sync = PlaybackSynchronizer::new(
            state,
            FakeSink {
                total: Some(Duration::from_millis(3000)),
                ..Default::default()
            },
            FakeMusic::default(),
        );

        let events = sync.play();
        assert_eq!(events, vec![PlaybackEvent::SceneStarted { scene: 0 }]);

        // Two ticks inside word 0: exactly one caption event.
        assert_eq!(
            sync.tick(),
            vec![PlaybackEvent::Caption { scene: 0, word: 0 }]
        );
        assert!(sync.tick().is_empty());

        sync.sink.advance(1100);
        assert_eq!(
            sync.tick(),
            vec![PlaybackEvent::Caption { scene: 0, word: 1 }]
        );
    }

    #[test]
    fn missing_timings_synthesize_even_boundaries() {
        let state = seeded_state(&[("alpha beta gamma delta", None)]);
        let mut sync = PlaybackSynchronizer::new(
            state,
            FakeSink {
                total: Some(Duration::from_millis(4000)),
                ..Default::default()
            },
            FakeMusic::default(),
        );
        sync.play();

        sync.sink.advance(1500);
        assert_eq!(
            sync.tick(),
            vec![PlaybackEvent::Caption { scene: 0, word: 1 }]
        );
        sync.sink.advance(1501);
        assert_eq!(
            sync.tick(),
            vec![PlaybackEvent::Caption { scene: 0, word: 3 }]
        );
    }

    #[test]
    fn scene_end_advances_and_restores_music_between_scenes() {
        let state = seeded_state(&[
            ("first scene", Some(timings(2, 1000))),
            ("second scene", Some(timings(2, 1000))),
        ]);
        let music = FakeMusic::default();
        let level = music.level.clone();
        let mut sync = PlaybackSynchronizer::new(
            state,
            FakeSink {
                total: Some(Duration::from_millis(1000)),
                ..Default::default()
            },
            music,
        );

        sync.play();
        assert_eq!(level.get(), MUSIC_DUCKED_LEVEL);

        sync.sink.advance(1000); // narration over
        let events = sync.tick();
        assert_eq!(
            events,
            vec![
                PlaybackEvent::SceneFinished { scene: 0 },
                PlaybackEvent::SceneStarted { scene: 1 },
            ]
        );
        // Ducked again for scene 1 after the between-scene restore.
        assert_eq!(level.get(), MUSIC_DUCKED_LEVEL);
        assert_eq!(sync.phase(), PlaybackPhase::Playing { scene: 1 });

        sync.sink.advance(1000);
        let events = sync.tick();
        assert_eq!(
            events,
            vec![
                PlaybackEvent::SceneFinished { scene: 1 },
                PlaybackEvent::Finished,
            ]
        );
        assert_eq!(sync.phase(), PlaybackPhase::Idle);
    }

    #[test]
    fn failed_scene_start_advances_instead_of_stalling() {
        let state = seeded_state(&[
            ("bad scene", None),
            ("good scene", Some(timings(2, 1000))),
        ]);
        let mut sync = PlaybackSynchronizer::new(
            state,
            FakeSink {
                total: Some(Duration::from_millis(1000)),
                fail_scenes: vec![0],
                ..Default::default()
            },
            FakeMusic::default(),
        );

        let events = sync.play();
        assert_eq!(
            events,
            vec![
                PlaybackEvent::SceneFinished { scene: 0 },
                PlaybackEvent::SceneStarted { scene: 1 },
            ]
        );
        assert_eq!(sync.phase(), PlaybackPhase::Playing { scene: 1 });
        assert_eq!(sync.sink.started, vec![1]);
    }

    #[test]
    fn stop_twice_from_any_state_is_idempotent() {
        let state = seeded_state(&[("only scene", Some(timings(2, 1000)))]);
        let music = FakeMusic::default();
        let stopped = music.stopped.clone();
        let mut sync = PlaybackSynchronizer::new(
            state,
            FakeSink {
                total: Some(Duration::from_millis(1000)),
                ..Default::default()
            },
            music,
        );

        // From Idle.
        sync.stop();
        sync.stop();
        assert_eq!(sync.phase(), PlaybackPhase::Idle);

        // From Playing.
        sync.play();
        sync.stop();
        assert_eq!(sync.phase(), PlaybackPhase::Idle);
        assert!(stopped.get());
        sync.stop();
        assert_eq!(sync.phase(), PlaybackPhase::Idle);
        assert!(sync.tick().is_empty());
    }

    #[test]
    fn empty_production_finishes_immediately() {
        let state = ProductionState::new();
        state.begin(Topic::default());
        let mut sync =
            PlaybackSynchronizer::new(state, FakeSink::default(), FakeMusic::default());
        let events = sync.play();
        assert_eq!(events, vec![PlaybackEvent::Finished]);
        assert_eq!(sync.phase(), PlaybackPhase::Idle);
    }
}
