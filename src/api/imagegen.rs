use crate::api::ImageGenerationProvider;
use crate::error::StudioError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const HF_IMAGE_URL: &str =
    "https://router.huggingface.co/hf-inference/models/black-forest-labs/FLUX.1-schnell";

/// On-demand image generation; invoked lazily when a deferred visual
/// reference is actually consumed.
pub struct HfImageClient {
    client: Client,
    token: String,
}

impl HfImageClient {
    pub fn new(client: Client, token: String) -> Self {
        HfImageClient { client, token }
    }
}

#[async_trait]
impl ImageGenerationProvider for HfImageClient {
    async fn generate(&self, prompt: &str) -> Result<Bytes, StudioError> {
        if self.token.is_empty() {
            return Err(StudioError::AssetNotFound(
                "image generation unavailable: hf_token not configured".into(),
            ));
        }

        let resp = self
            .client
            .post(HF_IMAGE_URL)
            .bearer_auth(&self.token)
            .json(&json!({ "inputs": prompt }))
            .timeout(Duration::from_secs(120))
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(StudioError::RateLimit(format!("image api HTTP {status}")));
        }
        if !status.is_success() {
            return Err(StudioError::Transport(format!("image api HTTP {status}")));
        }

        Ok(resp.bytes().await?)
    }
}
