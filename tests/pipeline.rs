use ai_topic_shorts::api::{
    ImageGenerationProvider, NarrationProvider, ProviderSet, ScriptStream, StockKind,
    StockMediaProvider, Synthesis, TextGenerationProvider,
};
use ai_topic_shorts::config::Config;
use ai_topic_shorts::error::StudioError;
use ai_topic_shorts::generator::Studio;
use ai_topic_shorts::render::engine::{ComposeJob, CompositingEngine};
use ai_topic_shorts::render::VideoExporter;
use ai_topic_shorts::scene::{
    AspectRatio, NarrationAsset, Production, Scene, SceneScript, Topic, VisualAsset, WordTiming,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

fn test_config() -> Config {
    Config {
        groq_key: String::new(),
        gemini_key: String::new(),
        hf_token: String::new(),
        pexels_key: String::new(),
        narration_base: "http://127.0.0.1:1".into(),
        narration_voice: "test-voice".into(),
        narration_language: "en".into(),
        // Unreachable on purpose; export falls back to narration-only.
        music_url: "http://127.0.0.1:1/music.mp3".into(),
    }
}

fn topic() -> Topic {
    Topic {
        title: "deep sea volcanoes".into(),
        language: "en".into(),
        aspect: AspectRatio::Wide,
    }
}

struct SseScript {
    scenes: Vec<SceneScript>,
}

#[async_trait]
impl TextGenerationProvider for SseScript {
    async fn submit(&self, _topic: &Topic) -> Result<ScriptStream, StudioError> {
        let mut chunks: Vec<Result<Bytes, StudioError>> = Vec::new();
        for scene in &self.scenes {
            let object = serde_json::json!({
                "script": scene.narration,
                "imagePrompt": scene.image_prompt,
                "pexelsQuery": scene.stock_query,
                "cameraAngle": scene.camera_angle,
                "mood": scene.mood,
            })
            .to_string();
            // Two deltas per scene so every object straddles a chunk.
            let split = object.len() / 2;
            for part in [&object[..split], &object[split..]] {
                let event = serde_json::json!({"choices": [{"delta": {"content": part}}]});
                chunks.push(Ok(Bytes::from(format!("data: {event}\n"))));
            }
        }
        chunks.push(Ok(Bytes::from_static(b"data: [DONE]\n")));
        Ok(futures_util::stream::iter(chunks).boxed())
    }
}

struct NoStock;

#[async_trait]
impl StockMediaProvider for NoStock {
    async fn search(
        &self,
        _query: &str,
        _kind: StockKind,
        _aspect: AspectRatio,
    ) -> Result<Option<String>, StudioError> {
        Ok(None)
    }
}

struct JpegBytes;

#[async_trait]
impl ImageGenerationProvider for JpegBytes {
    async fn generate(&self, _prompt: &str) -> Result<Bytes, StudioError> {
        Ok(Bytes::from_static(b"\xff\xd8jpeg"))
    }
}

struct TimedNarration {
    last_onset_ms: u64,
    words: usize,
}

#[async_trait]
impl NarrationProvider for TimedNarration {
    fn name(&self) -> &'static str {
        "timed"
    }

    fn stream_reference(&self, _text: &str, _voice: &str) -> String {
        "https://tts.example/stream".into()
    }

    async fn synthesize(&self, _text: &str, _voice: &str) -> Result<Synthesis, StudioError> {
        let timings = (0..self.words)
            .map(|index| WordTiming {
                index,
                onset_ms: self.last_onset_ms * index as u64 / (self.words as u64 - 1).max(1),
            })
            .collect();
        Ok(Synthesis {
            audio: Bytes::from_static(b"mp3"),
            timings: Some(timings),
        })
    }
}

struct DeadNarration;

#[async_trait]
impl NarrationProvider for DeadNarration {
    fn name(&self) -> &'static str {
        "dead"
    }

    fn stream_reference(&self, _text: &str, _voice: &str) -> String {
        "https://fallback.example/tts".into()
    }

    async fn synthesize(&self, _text: &str, _voice: &str) -> Result<Synthesis, StudioError> {
        Err(StudioError::Synthesis("always down".into()))
    }
}

fn scene_scripts(count: usize) -> Vec<SceneScript> {
    (0..count)
        .map(|i| SceneScript {
            narration: format!("narration for scene {i}"),
            image_prompt: format!("prompt {i}"),
            stock_query: format!("query {i}"),
            camera_angle: "wide".into(),
            mood: "calm".into(),
        })
        .collect()
}

fn fake_providers(scenes: Vec<SceneScript>) -> Arc<ProviderSet> {
    Arc::new(ProviderSet {
        textgen: Arc::new(SseScript { scenes }),
        stock: Arc::new(NoStock),
        imagegen: Arc::new(JpegBytes),
        narration_primary: Arc::new(TimedNarration {
            last_onset_ms: 3800,
            words: 4,
        }),
        narration_fallback: Arc::new(DeadNarration),
    })
}

#[tokio::test]
async fn streamed_production_resolves_every_scene() {
    let studio = Studio::from_parts(
        test_config(),
        reqwest::Client::new(),
        fake_providers(scene_scripts(3)),
    );

    let production = studio.run_production(topic()).await.unwrap();

    assert!(production.complete);
    assert_eq!(production.scenes.len(), 3);
    for (i, scene) in production.scenes.iter().enumerate() {
        assert_eq!(scene.index, i);
        assert_eq!(scene.narration, format!("narration for scene {i}"));
        assert!(scene.is_ready());
        // Stock misses on both kinds leave a deferred generated image.
        assert!(matches!(
            scene.visual,
            Some(VisualAsset::GeneratedImage { .. })
        ));
        assert!(scene.word_timings.is_some());
    }
}

#[tokio::test]
async fn production_fails_only_when_no_scene_extracted() {
    let studio = Studio::from_parts(
        test_config(),
        reqwest::Client::new(),
        fake_providers(Vec::new()),
    );

    let err = studio.run_production(topic()).await.unwrap_err();
    assert!(err.to_string().contains("no scenes"));
}

#[tokio::test]
async fn manifest_lists_every_scene_reference() {
    let studio = Studio::from_parts(
        test_config(),
        reqwest::Client::new(),
        fake_providers(scene_scripts(2)),
    );
    let production = studio.run_production(topic()).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("assets.txt");
    studio
        .write_asset_manifest(&production, &dest)
        .await
        .unwrap();

    let manifest = std::fs::read_to_string(&dest).unwrap();
    assert!(manifest.contains("Title: deep sea volcanoes"));
    assert!(manifest.contains("Scene 1:"));
    assert!(manifest.contains("Scene 2:"));
    assert!(manifest.contains("generate:prompt 0"));
}

struct RecordingEngine {
    seen: Mutex<Option<ComposeJob>>,
    workspace_seen: Mutex<Option<PathBuf>>,
}

#[async_trait]
impl CompositingEngine for RecordingEngine {
    async fn compose(
        &self,
        job: &ComposeJob,
        workspace: &Path,
        progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<PathBuf, StudioError> {
        let out = workspace.join(&job.output_name);
        tokio::fs::write(&out, b"mp4").await.unwrap();
        progress(1.0);
        *self.seen.lock().unwrap() = Some(job.clone());
        *self.workspace_seen.lock().unwrap() = Some(workspace.to_path_buf());
        Ok(out)
    }
}

struct FailingEngine {
    workspace_seen: Mutex<Option<PathBuf>>,
}

#[async_trait]
impl CompositingEngine for FailingEngine {
    async fn compose(
        &self,
        _job: &ComposeJob,
        workspace: &Path,
        _progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<PathBuf, StudioError> {
        // Leave litter behind to prove the workspace is still purged.
        tokio::fs::write(workspace.join("partial.mp4"), b"junk")
            .await
            .unwrap();
        *self.workspace_seen.lock().unwrap() = Some(workspace.to_path_buf());
        Err(StudioError::Composition("encoder blew up".into()))
    }
}

fn ready_production(durations_s: &[f64]) -> Production {
    let mut production = Production {
        topic: topic(),
        scenes: Vec::new(),
        complete: true,
    };
    for (i, duration) in durations_s.iter().enumerate() {
        let mut scene = Scene::from_script(
            i,
            SceneScript {
                narration: format!("scene {i} words"),
                image_prompt: format!("prompt {i}"),
                stock_query: String::new(),
                camera_angle: String::new(),
                mood: String::new(),
            },
        );
        scene.visual = Some(VisualAsset::GeneratedImage {
            prompt: format!("prompt {i}"),
        });
        scene.narration_audio = Some(NarrationAsset::Deferred {
            voice: "test-voice".into(),
        });
        // Last onset such that onset + 1.2s tail equals the target length.
        let last_onset_ms = ((duration - 1.2) * 1000.0).round() as u64;
        scene.word_timings = Some(vec![
            WordTiming {
                index: 0,
                onset_ms: 0,
            },
            WordTiming {
                index: 1,
                onset_ms: last_onset_ms,
            },
        ]);
        scene.visual_ready = true;
        scene.narration_ready = true;
        production.scenes.push(scene);
    }
    production
}

fn exporter_with(engine: Arc<dyn CompositingEngine>, output_dir: &Path) -> VideoExporter {
    VideoExporter::new(
        reqwest::Client::new(),
        Arc::new(JpegBytes),
        Arc::new(TimedNarration {
            last_onset_ms: 3800,
            words: 4,
        }),
        engine,
        // Unreachable; the export must degrade to narration-only audio.
        "http://127.0.0.1:1/music.mp3".into(),
        output_dir.to_path_buf(),
    )
}

#[tokio::test]
async fn export_builds_one_job_with_overlap_adjusted_duration() {
    let engine = Arc::new(RecordingEngine {
        seen: Mutex::new(None),
        workspace_seen: Mutex::new(None),
    });
    let out_dir = tempfile::tempdir().unwrap();
    let exporter = exporter_with(engine.clone(), out_dir.path());

    let production = ready_production(&[5.0, 4.0, 6.0]);
    let reached_full = Arc::new(AtomicBool::new(false));
    let progress = {
        let reached_full = reached_full.clone();
        Arc::new(move |frac: f32| {
            assert!((0.0..=1.0).contains(&frac));
            if frac >= 1.0 {
                reached_full.store(true, Ordering::SeqCst);
            }
        })
    };

    let artifact = exporter.export(&production, progress).await.unwrap();
    assert!(artifact.exists());
    assert!(reached_full.load(Ordering::SeqCst));

    let job = engine.seen.lock().unwrap().clone().unwrap();
    // Three visual + three narration inputs, no music (fetch fails).
    assert_eq!(job.inputs.len(), 6);
    assert!((job.expected_duration - 14.0).abs() < 1e-6);
    assert_eq!(job.audio_out, "narration_hot");
    assert!(job.filter_complex.contains("xfade"));

    // The per-run workspace is gone after a successful export.
    let workspace = engine.workspace_seen.lock().unwrap().clone().unwrap();
    assert!(!workspace.exists());
}

#[tokio::test]
async fn export_purges_workspace_on_engine_failure() {
    let engine = Arc::new(FailingEngine {
        workspace_seen: Mutex::new(None),
    });
    let out_dir = tempfile::tempdir().unwrap();
    let exporter = exporter_with(engine.clone(), out_dir.path());

    let production = ready_production(&[5.0]);
    let err = exporter
        .export(&production, Arc::new(|_frac: f32| {}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("encoder blew up"));

    let workspace = engine.workspace_seen.lock().unwrap().clone().unwrap();
    assert!(!workspace.exists());
}

#[tokio::test]
async fn export_rejects_partially_resolved_productions() {
    let out_dir = tempfile::tempdir().unwrap();
    let exporter = exporter_with(
        Arc::new(RecordingEngine {
            seen: Mutex::new(None),
            workspace_seen: Mutex::new(None),
        }),
        out_dir.path(),
    );

    let mut production = ready_production(&[5.0]);
    production.scenes[0].narration_ready = false;

    let err = exporter
        .export(&production, Arc::new(|_frac: f32| {}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("still resolving"));
}
