use std::fmt::Write;

/// Cross-fade length between adjacent scenes.
pub const TRANSITION_SECONDS: f64 = 0.5;
/// Tail padding after the last word onset.
pub const SCENE_TAIL_SECONDS: f64 = 1.2;
/// Scene length when no word timings exist.
pub const DEFAULT_SCENE_SECONDS: f64 = 5.0;

const FRAME_RATE: u32 = 25;
const NARRATION_GAIN: f64 = 1.5;
const MUSIC_GAIN: f64 = 0.1;
const MIX_SAMPLE_RATE: u32 = 44_100;

/// One node of the composition graph: named input ports, an operation,
/// named output ports. Input ports may be engine stream specifiers
/// (`0:v`) or outputs of earlier nodes.
#[derive(Debug, Clone)]
pub struct FilterNode {
    pub inputs: Vec<String>,
    pub op: FilterOp,
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum FilterOp {
    /// Slow pan/zoom over a still image, scaled to the frame preset.
    ImageMotion {
        width: u32,
        height: u32,
        duration: f64,
    },
    /// Scale/crop footage to the frame preset and trim to duration; the
    /// engine loops the input when the footage is shorter.
    VideoFit {
        width: u32,
        height: u32,
        duration: f64,
    },
    /// Uniform brightness/contrast/saturation lift plus vignette.
    ColorGrade,
    /// Common narration sample rate and channel layout.
    AudioNormalize,
    /// Gapless concat of the normalized narration streams.
    AudioConcat { count: usize },
    Gain { volume: f64 },
    /// Infinite music loop at the mix rate.
    MusicLoop,
    /// Opposing opacity ramps joining two visual streams.
    CrossFade { duration: f64, offset: f64 },
    /// Narration over music, shortest input wins.
    DuckMix,
}

impl FilterOp {
    fn lower(&self) -> String {
        match self {
            FilterOp::ImageMotion {
                width,
                height,
                duration,
            } => {
                let oversize = (f64::from(*width) * 1.2).round() as u32;
                let frames = (duration * f64::from(FRAME_RATE)).ceil() as u32;
                format!(
                    "scale={oversize}:-1,zoompan=z='min(zoom+0.001,1.2)':d={frames}:s={width}x{height},setpts=PTS-STARTPTS,format=yuv420p"
                )
            }
            FilterOp::VideoFit {
                width,
                height,
                duration,
            } => format!(
                "scale='if(gt(iw/ih,{width}/{height}),-1,{width})':'if(gt(iw/ih,{width}/{height}),{height},-1)',crop={width}:{height},trim=duration={duration:.3},setpts=PTS-STARTPTS,format=yuv420p"
            ),
            FilterOp::ColorGrade => {
                "eq=brightness=0.03:contrast=1.05:saturation=1.1,vignette=PI/4".to_string()
            }
            FilterOp::AudioNormalize => format!(
                "aresample={MIX_SAMPLE_RATE},aformat=sample_fmts=fltp:channel_layouts=stereo"
            ),
            FilterOp::AudioConcat { count } => format!("concat=n={count}:v=0:a=1"),
            FilterOp::Gain { volume } => format!("volume={volume}"),
            FilterOp::MusicLoop => {
                format!("aloop=loop=-1:size=2e9,aresample={MIX_SAMPLE_RATE}")
            }
            FilterOp::CrossFade { duration, offset } => {
                format!("xfade=transition=fade:duration={duration}:offset={offset:.3}")
            }
            FilterOp::DuckMix => "amix=inputs=2:duration=shortest".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FilterGraph {
    nodes: Vec<FilterNode>,
}

impl FilterGraph {
    pub fn add(&mut self, inputs: Vec<String>, op: FilterOp, outputs: Vec<String>) {
        self.nodes.push(FilterNode {
            inputs,
            op,
            outputs,
        });
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Lower the graph to the engine's filter-complex form.
    pub fn lower(&self) -> String {
        let mut out = String::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if i > 0 {
                out.push(';');
            }
            for input in &node.inputs {
                let _ = write!(out, "[{input}]");
            }
            out.push_str(&node.op.lower());
            for output in &node.outputs {
                let _ = write!(out, "[{output}]");
            }
        }
        out
    }
}

/// A staged scene, ready for graph construction. Input indices refer to the
/// engine's input table in staging order.
#[derive(Debug, Clone)]
pub struct StagedScene {
    pub visual_input: usize,
    pub audio_input: usize,
    pub is_video: bool,
    pub duration: f64,
}

#[derive(Debug, Clone)]
pub struct GraphPlan {
    pub filter_complex: String,
    pub video_out: String,
    pub audio_out: String,
    pub total_duration: f64,
}

/// Build the full composition: per-scene visual transform + grade, the
/// cross-fade chain, gapless narration concat, and the optional ducked
/// music mix. Transition offsets are precomputed from the complete scene
/// list, which is why a missing scene aborts the export upstream.
pub fn build_graph(
    scenes: &[StagedScene],
    frame: (u32, u32),
    music_input: Option<usize>,
) -> GraphPlan {
    let (width, height) = frame;
    let mut graph = FilterGraph::default();

    for (i, scene) in scenes.iter().enumerate() {
        let op = if scene.is_video {
            FilterOp::VideoFit {
                width,
                height,
                duration: scene.duration,
            }
        } else {
            FilterOp::ImageMotion {
                width,
                height,
                duration: scene.duration,
            }
        };
        graph.add(
            vec![format!("{}:v", scene.visual_input)],
            op,
            vec![format!("fit{i}")],
        );
        graph.add(
            vec![format!("fit{i}")],
            FilterOp::ColorGrade,
            vec![format!("v{i}")],
        );
        graph.add(
            vec![format!("{}:a", scene.audio_input)],
            FilterOp::AudioNormalize,
            vec![format!("a{i}")],
        );
    }

    graph.add(
        (0..scenes.len()).map(|i| format!("a{i}")).collect(),
        FilterOp::AudioConcat {
            count: scenes.len(),
        },
        vec!["narration".to_string()],
    );
    graph.add(
        vec!["narration".to_string()],
        FilterOp::Gain {
            volume: NARRATION_GAIN,
        },
        vec!["narration_hot".to_string()],
    );

    // Chain cross-fades; each overlap shortens the total by its duration.
    let mut current = "v0".to_string();
    let mut total = scenes.first().map(|s| s.duration).unwrap_or(0.0);
    for (i, scene) in scenes.iter().enumerate().skip(1) {
        let out = format!("vx{i}");
        graph.add(
            vec![current, format!("v{i}")],
            FilterOp::CrossFade {
                duration: TRANSITION_SECONDS,
                offset: total - TRANSITION_SECONDS,
            },
            vec![out.clone()],
        );
        current = out;
        total += scene.duration - TRANSITION_SECONDS;
    }

    let audio_out = if let Some(music) = music_input {
        graph.add(
            vec![format!("{music}:a")],
            FilterOp::Gain { volume: MUSIC_GAIN },
            vec!["bed".to_string()],
        );
        graph.add(
            vec!["bed".to_string()],
            FilterOp::MusicLoop,
            vec!["bed_loop".to_string()],
        );
        graph.add(
            vec!["narration_hot".to_string(), "bed_loop".to_string()],
            FilterOp::DuckMix,
            vec!["mix".to_string()],
        );
        "mix".to_string()
    } else {
        "narration_hot".to_string()
    };

    GraphPlan {
        filter_complex: graph.lower(),
        video_out: current,
        audio_out,
        total_duration: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn staged(durations: &[f64]) -> Vec<StagedScene> {
        durations
            .iter()
            .enumerate()
            .map(|(i, d)| StagedScene {
                visual_input: i * 2,
                audio_input: i * 2 + 1,
                is_video: i % 2 == 0,
                duration: *d,
            })
            .collect()
    }

    #[test]
    fn cross_fades_shorten_total_duration() {
        let plan = build_graph(&staged(&[5.0, 4.0, 6.0]), (1280, 720), None);
        // 15.0 minus two 0.5s overlaps.
        assert!((plan.total_duration - 14.0).abs() < 1e-9);
        assert_eq!(plan.video_out, "vx2");
    }

    #[test]
    fn transition_offsets_follow_cumulative_duration() {
        let plan = build_graph(&staged(&[5.0, 4.0, 6.0]), (1280, 720), None);
        // First fade starts at 5.0 - 0.5, second at (5.0 + 3.5) - 0.5.
        assert!(plan.filter_complex.contains("offset=4.500"));
        assert!(plan.filter_complex.contains("offset=8.000"));
    }

    #[test]
    fn single_scene_needs_no_transition() {
        let plan = build_graph(&staged(&[7.5]), (720, 1280), None);
        assert_eq!(plan.video_out, "v0");
        assert!(!plan.filter_complex.contains("xfade"));
        assert!((plan.total_duration - 7.5).abs() < 1e-9);
    }

    #[test]
    fn images_pan_and_videos_fit() {
        let plan = build_graph(&staged(&[5.0, 4.0]), (1280, 720), None);
        // Scene 0 is video, scene 1 is image per the staging fixture.
        assert!(plan.filter_complex.contains("crop=1280:720"));
        assert!(plan.filter_complex.contains("zoompan"));
        assert!(plan.filter_complex.contains("vignette=PI/4"));
    }

    #[test]
    fn music_branch_is_looped_attenuated_and_mixed_shortest() {
        let plan = build_graph(&staged(&[5.0]), (1280, 720), Some(2));
        assert_eq!(plan.audio_out, "mix");
        assert!(plan.filter_complex.contains("[2:a]volume=0.1[bed]"));
        assert!(plan.filter_complex.contains("aloop=loop=-1"));
        assert!(plan
            .filter_complex
            .contains("amix=inputs=2:duration=shortest"));
    }

    #[test]
    fn without_music_the_boosted_narration_is_the_output() {
        let plan = build_graph(&staged(&[5.0]), (1280, 720), None);
        assert_eq!(plan.audio_out, "narration_hot");
        assert!(plan.filter_complex.contains("volume=1.5"));
        assert!(!plan.filter_complex.contains("amix"));
    }

    #[test]
    fn named_ports_wire_grade_after_fit() {
        let plan = build_graph(&staged(&[5.0]), (1280, 720), None);
        assert!(plan.filter_complex.contains("[0:v]"));
        assert!(plan.filter_complex.contains("[fit0]eq="));
        assert!(plan.filter_complex.contains("[1:a]aresample=44100"));
    }
}
