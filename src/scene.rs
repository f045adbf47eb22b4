use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "9:16")]
    Tall,
}

impl AspectRatio {
    pub fn orientation(self) -> &'static str {
        match self {
            AspectRatio::Wide => "landscape",
            AspectRatio::Tall => "portrait",
        }
    }

    /// Output frame preset for the compositing engine.
    pub fn frame(self) -> (u32, u32) {
        match self {
            AspectRatio::Wide => (1280, 720),
            AspectRatio::Tall => (720, 1280),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topic {
    pub title: String,
    pub language: String,
    pub aspect: AspectRatio,
}

/// One scene record as extracted from the model stream. Only the narration
/// field is mandatory; everything else degrades to empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneScript {
    #[serde(rename = "script")]
    pub narration: String,
    #[serde(rename = "imagePrompt", default)]
    pub image_prompt: String,
    #[serde(rename = "pexelsQuery", default)]
    pub stock_query: String,
    #[serde(rename = "cameraAngle", default)]
    pub camera_angle: String,
    #[serde(default)]
    pub mood: String,
}

/// Onset of one narration word. The span to the next onset is derived at
/// lookup time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordTiming {
    pub index: usize,
    pub onset_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisualAsset {
    StockVideo { url: String },
    StockPhoto { url: String },
    /// Deferred reference; the image is generated at consumption time.
    GeneratedImage { prompt: String },
}

impl VisualAsset {
    pub fn is_video(&self) -> bool {
        matches!(self, VisualAsset::StockVideo { .. })
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            VisualAsset::StockVideo { .. } => "stock video",
            VisualAsset::StockPhoto { .. } => "stock photo",
            VisualAsset::GeneratedImage { .. } => "generated image",
        }
    }
}

impl fmt::Display for VisualAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisualAsset::StockVideo { url } | VisualAsset::StockPhoto { url } => write!(f, "{url}"),
            VisualAsset::GeneratedImage { prompt } => write!(f, "generate:{prompt}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NarrationAsset {
    /// Streaming reference to the primary provider, consumable before
    /// synthesis completes.
    Deferred { voice: String },
    /// Degraded direct-fetch reference from a fallback provider.
    Remote { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub index: usize,
    pub narration: String,
    pub image_prompt: String,
    pub stock_query: String,
    pub camera_angle: String,
    pub mood: String,
    pub visual: Option<VisualAsset>,
    pub narration_audio: Option<NarrationAsset>,
    pub word_timings: Option<Vec<WordTiming>>,
    pub visual_ready: bool,
    pub narration_ready: bool,
}

impl Scene {
    pub fn from_script(index: usize, script: SceneScript) -> Self {
        Scene {
            index,
            narration: script.narration,
            image_prompt: script.image_prompt,
            stock_query: script.stock_query,
            camera_angle: script.camera_angle,
            mood: script.mood,
            visual: None,
            narration_audio: None,
            word_timings: None,
            visual_ready: false,
            narration_ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.visual_ready && self.narration_ready
    }

    pub fn word_count(&self) -> usize {
        self.narration.split_whitespace().count()
    }

    /// Partial merge; `None` fields leave the current value untouched.
    /// Timings are re-sorted on write so lookup can rely on ascending onsets.
    pub(crate) fn apply(&mut self, patch: ScenePatch) {
        if let Some(visual) = patch.visual {
            self.visual = Some(visual);
        }
        if let Some(narration) = patch.narration_audio {
            self.narration_audio = Some(narration);
        }
        if let Some(mut timings) = patch.word_timings {
            timings.sort_by_key(|t| t.onset_ms);
            self.word_timings = Some(timings);
        }
        if let Some(ready) = patch.visual_ready {
            self.visual_ready = ready;
        }
        if let Some(ready) = patch.narration_ready {
            self.narration_ready = ready;
        }
    }
}

/// Index-scoped partial update produced by one resolver branch.
#[derive(Debug, Clone, Default)]
pub struct ScenePatch {
    pub visual: Option<VisualAsset>,
    pub narration_audio: Option<NarrationAsset>,
    pub word_timings: Option<Vec<WordTiming>>,
    pub visual_ready: Option<bool>,
    pub narration_ready: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Production {
    pub topic: Topic,
    pub scenes: Vec<Scene>,
    pub complete: bool,
}

impl Production {
    pub fn all_ready(&self) -> bool {
        !self.scenes.is_empty() && self.scenes.iter().all(Scene::is_ready)
    }
}
