use crate::api::ProviderSet;
use crate::config::Config;
use crate::production::ProductionState;
use crate::render::engine::FfmpegEngine;
use crate::render::VideoExporter;
use crate::resolver::{AssetResolver, ResolveSettings};
use crate::scene::{NarrationAsset, Production, Scene, SceneScript, Topic, VisualAsset};
use crate::script_stream::ScriptStreamParser;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;

const OUTPUT_DIR: &str = "output";

/// The production pipeline: one active production at a time, resolved
/// against whatever providers the configuration enables.
pub struct Studio {
    config: Config,
    client: reqwest::Client,
    providers: Arc<ProviderSet>,
    state: ProductionState,
}

impl Studio {
    pub fn new(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;
        let providers = Arc::new(ProviderSet::from_config(&config, &client));
        Ok(Self::from_parts(config, client, providers))
    }

    /// Assemble from explicit parts; tests substitute in-memory providers.
    pub fn from_parts(
        config: Config,
        client: reqwest::Client,
        providers: Arc<ProviderSet>,
    ) -> Self {
        Studio {
            config,
            client,
            providers,
            state: ProductionState::new(),
        }
    }

    /// Shared handle for UI snapshot reads.
    pub fn state(&self) -> ProductionState {
        self.state.clone()
    }

    /// Stream the script for a topic, admit scenes as they surface, and
    /// resolve assets for every scene in parallel. Returns the completed
    /// production; fails only when zero scenes could be extracted.
    pub async fn run_production(&self, topic: Topic) -> Result<Production> {
        let stamp = self.state.begin(topic.clone());
        logi(format!("production started: \"{}\"", topic.title));

        let mut stream = self
            .providers
            .textgen
            .submit(&topic)
            .await
            .map_err(|err| anyhow::anyhow!("script generation failed: {err}"))?;

        let settings = ResolveSettings {
            aspect: topic.aspect,
            voice: self.config.narration_voice.clone(),
        };
        let resolver = Arc::new(AssetResolver::new(
            Arc::clone(&self.providers),
            self.state.clone(),
            stamp,
            settings,
        ));

        let mut parser = ScriptStreamParser::new();
        let mut tasks = JoinSet::new();
        let mut next_index = 0usize;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    // A broken stream is not fatal as long as something was
                    // extracted before it died.
                    logw(format!("script stream interrupted: {err}"));
                    break;
                }
            };
            for script in parser.feed(&chunk) {
                self.admit_scene(next_index, script, stamp, &resolver, &mut tasks);
                next_index += 1;
            }
        }
        for script in parser.finish() {
            self.admit_scene(next_index, script, stamp, &resolver, &mut tasks);
            next_index += 1;
        }

        if parser.emitted() == 0 {
            anyhow::bail!("no scenes could be extracted from the generated script");
        }
        logok(format!("script complete: {} scenes", parser.emitted()));

        while tasks.join_next().await.is_some() {}
        self.state.mark_complete(stamp);
        logok("production complete");
        Ok(self.state.snapshot())
    }

    fn admit_scene(
        &self,
        index: usize,
        script: SceneScript,
        stamp: u64,
        resolver: &Arc<AssetResolver>,
        tasks: &mut JoinSet<()>,
    ) {
        let scene = Scene::from_script(index, script);
        if !self.state.append_scene(stamp, scene.clone()) {
            return;
        }
        logok(format!("scene {}: script received", index + 1));

        let resolver = Arc::clone(resolver);
        tasks.spawn(async move {
            resolver.resolve_scene(&scene).await;
        });
    }

    pub fn exporter(&self) -> VideoExporter {
        VideoExporter::new(
            self.client.clone(),
            Arc::clone(&self.providers.imagegen),
            Arc::clone(&self.providers.narration_primary),
            Arc::new(FfmpegEngine),
            self.config.music_url.clone(),
            PathBuf::from(OUTPUT_DIR),
        )
    }

    /// Plain-text manifest of every scene's resolved references, for manual
    /// asset download alongside a full render.
    pub async fn write_asset_manifest(
        &self,
        production: &Production,
        dest: &Path,
    ) -> Result<()> {
        let mut out = String::new();
        let _ = writeln!(out, "Title: {}\n", production.topic.title);

        for scene in &production.scenes {
            let _ = writeln!(out, "Scene {}:", scene.index + 1);
            let visual = scene
                .visual
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "(unresolved)".to_string());
            let _ = writeln!(out, "Visual: {visual}");
            let narration = match &scene.narration_audio {
                Some(NarrationAsset::Deferred { voice }) => self
                    .providers
                    .narration_primary
                    .stream_reference(&scene.narration, voice),
                Some(NarrationAsset::Remote { url }) => url.clone(),
                None => "(unresolved)".to_string(),
            };
            let _ = writeln!(out, "Audio: {narration}");
            let _ = writeln!(out, "Script: {}", scene.narration);
            let _ = writeln!(out, "-------------------\n");
        }

        tokio::fs::write(dest, out.as_bytes())
            .await
            .with_context(|| format!("Failed to write manifest: {}", dest.display()))?;
        logok(format!("asset manifest written: {}", dest.display()));
        Ok(())
    }

    pub fn summarize(&self, production: &Production) -> String {
        let mut out = String::new();
        for scene in &production.scenes {
            let visual = scene
                .visual
                .as_ref()
                .map(VisualAsset::kind_label)
                .unwrap_or("pending");
            let narration = if scene.narration_ready {
                if scene.word_timings.is_some() {
                    "narration+timings"
                } else {
                    "narration"
                }
            } else {
                "pending"
            };
            let _ = writeln!(
                out,
                "scene {:>2}: {:<16} {:<18} {}",
                scene.index + 1,
                visual,
                narration,
                scene.narration
            );
        }
        out
    }
}
