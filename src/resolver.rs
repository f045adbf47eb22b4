use crate::api::{ProviderSet, StockKind};
use crate::production::ProductionState;
use crate::scene::{AspectRatio, NarrationAsset, Scene, ScenePatch, VisualAsset};
use crate::{logok, logw};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ResolveSettings {
    pub aspect: AspectRatio,
    pub voice: String,
}

/// Resolves one scene's visual and narration families through their fallback
/// chains, patching the shared production as partial results land. Carries
/// the generation stamp it was spawned under; results for a superseded
/// production are discarded by the state, not written.
pub struct AssetResolver {
    providers: Arc<ProviderSet>,
    state: ProductionState,
    stamp: u64,
    settings: ResolveSettings,
}

impl AssetResolver {
    pub fn new(
        providers: Arc<ProviderSet>,
        state: ProductionState,
        stamp: u64,
        settings: ResolveSettings,
    ) -> Self {
        AssetResolver {
            providers,
            state,
            stamp,
            settings,
        }
    }

    /// Both families run concurrently; neither blocks the other.
    pub async fn resolve_scene(&self, scene: &Scene) {
        tokio::join!(self.resolve_visual(scene), self.resolve_narration(scene));
    }

    async fn resolve_visual(&self, scene: &Scene) {
        let visual = self.pick_visual(scene).await;
        let label = visual.kind_label();
        let patch = ScenePatch {
            visual: Some(visual),
            visual_ready: Some(true),
            ..Default::default()
        };
        if self.state.patch_scene(self.stamp, scene.index, patch) {
            logok(format!("scene {}: visual ready ({label})", scene.index + 1));
        }
    }

    /// Stock video, then stock photo, then a deferred generated image. Every
    /// failure advances the chain; the tail never fails.
    async fn pick_visual(&self, scene: &Scene) -> VisualAsset {
        match self
            .providers
            .stock
            .search(&scene.stock_query, StockKind::Video, self.settings.aspect)
            .await
        {
            Ok(Some(url)) => return VisualAsset::StockVideo { url },
            Ok(None) => {}
            Err(err) => logw(format!(
                "scene {}: stock video search failed: {err}",
                scene.index + 1
            )),
        }

        match self
            .providers
            .stock
            .search(&scene.stock_query, StockKind::Photo, self.settings.aspect)
            .await
        {
            Ok(Some(url)) => return VisualAsset::StockPhoto { url },
            Ok(None) => {}
            Err(err) => logw(format!(
                "scene {}: stock photo search failed: {err}",
                scene.index + 1
            )),
        }

        VisualAsset::GeneratedImage {
            prompt: scene.image_prompt.clone(),
        }
    }

    async fn resolve_narration(&self, scene: &Scene) {
        let primary = &self.providers.narration_primary;

        // Optimistic deferred reference so playback can start before
        // synthesis completes.
        let optimistic = ScenePatch {
            narration_audio: Some(NarrationAsset::Deferred {
                voice: self.settings.voice.clone(),
            }),
            ..Default::default()
        };
        if !self.state.patch_scene(self.stamp, scene.index, optimistic) {
            return;
        }

        match primary
            .synthesize(&scene.narration, &self.settings.voice)
            .await
        {
            Ok(synthesis) => {
                let patch = ScenePatch {
                    word_timings: synthesis.timings,
                    narration_ready: Some(true),
                    ..Default::default()
                };
                if self.state.patch_scene(self.stamp, scene.index, patch) {
                    logok(format!(
                        "scene {}: narration ready ({})",
                        scene.index + 1,
                        primary.name()
                    ));
                }
            }
            Err(err) => {
                logw(format!(
                    "scene {}: {} failed: {err}",
                    scene.index + 1,
                    primary.name()
                ));
                self.resolve_narration_fallback(scene).await;
            }
        }
    }

    async fn resolve_narration_fallback(&self, scene: &Scene) {
        let fallback = &self.providers.narration_fallback;
        let reference = NarrationAsset::Remote {
            url: fallback.stream_reference(&scene.narration, &self.settings.voice),
        };

        let patch = match fallback
            .synthesize(&scene.narration, &self.settings.voice)
            .await
        {
            Ok(synthesis) => ScenePatch {
                narration_audio: Some(reference),
                word_timings: synthesis.timings,
                narration_ready: Some(true),
                ..Default::default()
            },
            Err(err) => {
                logw(format!(
                    "scene {}: {} failed: {err} (narration degraded)",
                    scene.index + 1,
                    fallback.name()
                ));
                // Exhaustion still marks the scene ready; the reference is
                // best-effort, never a hard production failure.
                ScenePatch {
                    narration_audio: Some(reference),
                    narration_ready: Some(true),
                    ..Default::default()
                }
            }
        };

        if self.state.patch_scene(self.stamp, scene.index, patch) {
            logok(format!(
                "scene {}: narration ready ({})",
                scene.index + 1,
                fallback.name()
            ));
        }
    }
}
