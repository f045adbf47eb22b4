use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use std::sync::Arc;

pub mod imagegen;
pub mod pexels;
pub mod textgen;
pub mod tts;

use crate::config::Config;
use crate::error::StudioError;
use crate::scene::{AspectRatio, Topic, WordTiming};

/// Byte chunks from a script generation request: a live token stream or a
/// single full document yielded as one chunk.
pub type ScriptStream = BoxStream<'static, Result<Bytes, StudioError>>;

#[async_trait]
pub trait TextGenerationProvider: Send + Sync {
    async fn submit(&self, topic: &Topic) -> Result<ScriptStream, StudioError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockKind {
    Video,
    Photo,
}

#[async_trait]
pub trait StockMediaProvider: Send + Sync {
    /// Best match for the query, or `Ok(None)` when the catalog has nothing.
    async fn search(
        &self,
        query: &str,
        kind: StockKind,
        aspect: AspectRatio,
    ) -> Result<Option<String>, StudioError>;
}

#[async_trait]
pub trait ImageGenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<Bytes, StudioError>;
}

pub struct Synthesis {
    pub audio: Bytes,
    pub timings: Option<Vec<WordTiming>>,
}

#[async_trait]
pub trait NarrationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// A directly consumable audio reference, available before synthesis
    /// completes.
    fn stream_reference(&self, text: &str, voice: &str) -> String;

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Synthesis, StudioError>;
}

/// Every capability the pipeline consumes, behind trait objects so tests can
/// substitute in-memory fakes.
pub struct ProviderSet {
    pub textgen: Arc<dyn TextGenerationProvider>,
    pub stock: Arc<dyn StockMediaProvider>,
    pub imagegen: Arc<dyn ImageGenerationProvider>,
    pub narration_primary: Arc<dyn NarrationProvider>,
    pub narration_fallback: Arc<dyn NarrationProvider>,
}

impl ProviderSet {
    pub fn from_config(cfg: &Config, client: &reqwest::Client) -> Self {
        ProviderSet {
            textgen: Arc::new(textgen::TextGenerationRouter::new(client.clone(), cfg)),
            stock: Arc::new(pexels::PexelsClient::new(
                client.clone(),
                cfg.pexels_key.clone(),
            )),
            imagegen: Arc::new(imagegen::HfImageClient::new(
                client.clone(),
                cfg.hf_token.clone(),
            )),
            narration_primary: Arc::new(tts::WordBoundaryTts::new(
                client.clone(),
                cfg.narration_base.clone(),
            )),
            narration_fallback: Arc::new(tts::TranslateTts::new(
                client.clone(),
                cfg.narration_language.clone(),
            )),
        }
    }
}

pub(crate) fn url_encode_component(input: &str) -> String {
    let mut out = String::new();
    for b in input.as_bytes() {
        let c = *b as char;
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
            out.push(c);
        } else if c == ' ' {
            out.push_str("%20");
        } else {
            out.push('%');
            out.push_str(&format!("{:02X}", b));
        }
    }
    out
}
