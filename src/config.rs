use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "groq_api_key")]
    #[serde(default)]
    pub groq_key: String,
    #[serde(rename = "gemini_api_key")]
    #[serde(default)]
    pub gemini_key: String,
    #[serde(rename = "hf_token")]
    #[serde(default)]
    pub hf_token: String,
    #[serde(rename = "pexels_api_key")]
    #[serde(default)]
    pub pexels_key: String,
    #[serde(rename = "narration_base_url")]
    #[serde(default = "default_narration_base")]
    pub narration_base: String,
    #[serde(rename = "narration_voice")]
    #[serde(default = "default_voice_id")]
    pub narration_voice: String,
    #[serde(rename = "narration_language")]
    #[serde(default = "default_language")]
    pub narration_language: String,
    #[serde(rename = "music_url")]
    #[serde(default = "default_music_url")]
    pub music_url: String,
}

fn default_narration_base() -> String {
    "http://127.0.0.1:5002".to_string()
}

fn default_voice_id() -> String {
    "ar-EG-ShakirNeural".to_string()
}

fn default_language() -> String {
    "ar".to_string()
}

fn default_music_url() -> String {
    "https://cdn.pixabay.com/download/audio/2022/03/10/audio_c8c8a7315b.mp3".to_string()
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: Config = serde_json::from_str(&content)?;

        if config.groq_key.is_empty() && config.gemini_key.is_empty() && config.hf_token.is_empty()
        {
            anyhow::bail!(
                "config.json: at least one of groq_api_key, gemini_api_key, hf_token is required"
            );
        }

        Ok(config)
    }
}
