use crate::api::{ImageGenerationProvider, NarrationProvider};
use crate::error::StudioError;
use crate::scene::{NarrationAsset, Production, Scene, VisualAsset};
use crate::{logi, logok, logw};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub mod engine;
pub mod graph;

use engine::{ComposeJob, CompositingEngine, EngineInput};
use graph::{build_graph, StagedScene, DEFAULT_SCENE_SECONDS, SCENE_TAIL_SECONDS};

pub type ProgressFn = Arc<dyn Fn(f32) + Send + Sync>;

/// Share of the progress bar spent staging assets; the engine encode maps
/// onto the remainder.
const STAGING_SHARE: f32 = 0.3;
const FETCH_TIMEOUT_SECS: u64 = 300;

/// Builds one composition from a fully-resolved production and drives the
/// compositing engine to an encoded file. The per-run workspace is purged on
/// every exit path.
pub struct VideoExporter {
    client: reqwest::Client,
    imagegen: Arc<dyn ImageGenerationProvider>,
    narration: Arc<dyn NarrationProvider>,
    engine: Arc<dyn CompositingEngine>,
    music_url: String,
    output_dir: PathBuf,
}

impl VideoExporter {
    pub fn new(
        client: reqwest::Client,
        imagegen: Arc<dyn ImageGenerationProvider>,
        narration: Arc<dyn NarrationProvider>,
        engine: Arc<dyn CompositingEngine>,
        music_url: String,
        output_dir: PathBuf,
    ) -> Self {
        VideoExporter {
            client,
            imagegen,
            narration,
            engine,
            music_url,
            output_dir,
        }
    }

    pub async fn export(
        &self,
        production: &Production,
        progress: ProgressFn,
    ) -> Result<PathBuf, StudioError> {
        if production.scenes.is_empty() {
            return Err(StudioError::Composition("nothing to export".into()));
        }
        if !production.all_ready() {
            return Err(StudioError::Composition(
                "scenes are still resolving; export needs a fully-ready production".into(),
            ));
        }

        // Dropped on every exit path, taking all staged artifacts with it.
        let workspace = tempfile::tempdir()
            .map_err(|err| StudioError::Composition(format!("workspace setup failed: {err}")))?;

        let mut inputs: Vec<EngineInput> = Vec::new();
        let mut staged: Vec<StagedScene> = Vec::new();

        for scene in &production.scenes {
            let (visual_path, is_video) = self.stage_visual(scene, workspace.path()).await?;
            let audio_path = self.stage_narration(scene, workspace.path()).await?;

            let visual_input = inputs.len();
            inputs.push(EngineInput {
                path: visual_path,
                looped: is_video,
            });
            let audio_input = inputs.len();
            inputs.push(EngineInput {
                path: audio_path,
                looped: false,
            });

            staged.push(StagedScene {
                visual_input,
                audio_input,
                is_video,
                duration: scene_duration(scene),
            });

            progress((staged.len() as f32 / production.scenes.len() as f32) * STAGING_SHARE);
        }

        let music_input = match self.stage_music(workspace.path()).await {
            Ok(path) => {
                let index = inputs.len();
                inputs.push(EngineInput {
                    path,
                    looped: false,
                });
                Some(index)
            }
            Err(err) => {
                logw(format!("music fetch failed: {err}; mixing narration only"));
                None
            }
        };

        let plan = build_graph(&staged, production.topic.aspect.frame(), music_input);
        logi(format!(
            "composing {} scenes, {:.1}s total",
            staged.len(),
            plan.total_duration
        ));

        let job = ComposeJob {
            inputs,
            filter_complex: plan.filter_complex,
            video_out: plan.video_out,
            audio_out: plan.audio_out,
            expected_duration: plan.total_duration,
            output_name: "output.mp4".to_string(),
        };

        let encode_progress = {
            let progress = Arc::clone(&progress);
            move |frac: f32| progress(STAGING_SHARE + frac * (1.0 - STAGING_SHARE))
        };
        let engine_out = self
            .engine
            .compose(&job, workspace.path(), &encode_progress)
            .await?;

        // Move the artifact out before the workspace is purged.
        let final_path = self
            .output_dir
            .join(format!("{}.mp4", output_file_stem(&production.topic.title)));
        tokio::fs::copy(&engine_out, &final_path)
            .await
            .map_err(|err| {
                StudioError::Composition(format!(
                    "failed to place output at {}: {err}",
                    final_path.display()
                ))
            })?;

        progress(1.0);
        logok(format!("export complete: {}", final_path.display()));
        Ok(final_path)
    }

    async fn stage_visual(
        &self,
        scene: &Scene,
        workspace: &Path,
    ) -> Result<(PathBuf, bool), StudioError> {
        let visual = scene.visual.as_ref().ok_or_else(|| {
            StudioError::Composition(format!("scene {}: no visual resolved", scene.index + 1))
        })?;

        let bytes = match visual {
            VisualAsset::StockVideo { url } | VisualAsset::StockPhoto { url } => {
                self.fetch_url(url).await
            }
            // Deferred references resolve here, at consumption time.
            VisualAsset::GeneratedImage { prompt } => self.imagegen.generate(prompt).await,
        }
        .map_err(|err| {
            StudioError::Composition(format!(
                "scene {}: visual fetch failed: {err}",
                scene.index + 1
            ))
        })?;

        let ext = if visual.is_video() { "mp4" } else { "jpg" };
        let path = workspace.join(format!("input_{}.{ext}", scene.index));
        tokio::fs::write(&path, &bytes).await.map_err(|err| {
            StudioError::Composition(format!("scene {}: stage failed: {err}", scene.index + 1))
        })?;
        Ok((path, visual.is_video()))
    }

    async fn stage_narration(
        &self,
        scene: &Scene,
        workspace: &Path,
    ) -> Result<PathBuf, StudioError> {
        let narration = scene.narration_audio.as_ref().ok_or_else(|| {
            StudioError::Composition(format!("scene {}: no narration resolved", scene.index + 1))
        })?;

        let bytes = match narration {
            NarrationAsset::Deferred { voice } => self
                .narration
                .synthesize(&scene.narration, voice)
                .await
                .map(|s| s.audio),
            NarrationAsset::Remote { url } => self.fetch_url(url).await,
        }
        .map_err(|err| {
            StudioError::Composition(format!(
                "scene {}: narration fetch failed: {err}",
                scene.index + 1
            ))
        })?;

        let path = workspace.join(format!("audio_{}.mp3", scene.index));
        tokio::fs::write(&path, &bytes).await.map_err(|err| {
            StudioError::Composition(format!("scene {}: stage failed: {err}", scene.index + 1))
        })?;
        Ok(path)
    }

    async fn stage_music(&self, workspace: &Path) -> Result<PathBuf, StudioError> {
        let bytes = self.fetch_url(&self.music_url).await?;
        let path = workspace.join("bg_music.mp3");
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|err| StudioError::Transport(format!("music stage failed: {err}")))?;
        Ok(path)
    }

    async fn fetch_url(&self, url: &str) -> Result<Bytes, StudioError> {
        let resp = self
            .client
            .get(url)
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(StudioError::Transport(format!(
                "HTTP {} for {url}",
                resp.status()
            )));
        }
        Ok(resp.bytes().await?)
    }
}

/// Last word onset plus tail padding, or the fixed default when the scene
/// has no timings.
pub fn scene_duration(scene: &Scene) -> f64 {
    match scene.word_timings.as_deref() {
        Some([.., last]) => last.onset_ms as f64 / 1000.0 + SCENE_TAIL_SECONDS,
        _ => DEFAULT_SCENE_SECONDS,
    }
}

fn output_file_stem(title: &str) -> String {
    let mut out = String::new();
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            out.push(ch);
        } else if ch == ' ' && !out.ends_with('-') {
            out.push('-');
        }
    }
    if out.is_empty() {
        out.push_str("production");
    }
    out
}
