use crate::api::{ScriptStream, TextGenerationProvider};
use crate::config::Config;
use crate::error::StudioError;
use crate::scene::Topic;
use crate::{logi, logw};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const GROQ_MODEL: &str = "llama-3.3-70b-versatile";
const GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";
const HF_CHAT_URL_BASE: &str = "https://api-inference.huggingface.co/models";
const HF_FALLBACK_MODELS: &[&str] = &[
    "Qwen/Qwen2.5-72B-Instruct",
    "meta-llama/Llama-3.1-8B-Instruct",
    "mistralai/Mistral-7B-Instruct-v0.3",
];

pub const SCENES_PER_PRODUCTION: usize = 5;
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Ordered fallback chain over every configured text provider. Groq streams
/// token deltas; Gemini and the Hugging Face emergency models answer with a
/// single document, surfaced as a one-chunk stream.
pub struct TextGenerationRouter {
    client: Client,
    groq_key: String,
    gemini_key: String,
    hf_token: String,
}

impl TextGenerationRouter {
    pub fn new(client: Client, cfg: &Config) -> Self {
        TextGenerationRouter {
            client,
            groq_key: cfg.groq_key.clone(),
            gemini_key: cfg.gemini_key.clone(),
            hf_token: cfg.hf_token.clone(),
        }
    }

    async fn submit_groq(&self, prompt: &str) -> Result<ScriptStream, StudioError> {
        let body = json!({
            "model": GROQ_MODEL,
            "messages": [{"role": "user", "content": prompt}],
            "response_format": {"type": "json_object"},
            "stream": true,
        });

        let resp = self
            .client
            .post(GROQ_URL)
            .bearer_auth(&self.groq_key)
            .json(&body)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(StudioError::RateLimit(format!("groq HTTP {status}")));
        }
        if !status.is_success() {
            return Err(StudioError::Transport(format!("groq HTTP {status}")));
        }

        Ok(resp.bytes_stream().map_err(StudioError::from).boxed())
    }

    async fn submit_gemini(&self, prompt: &str) -> Result<ScriptStream, StudioError> {
        let url = format!("{GEMINI_URL}?key={}", self.gemini_key);
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {"responseMimeType": "application/json"},
        });

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(StudioError::RateLimit(format!("gemini HTTP {status}")));
        }
        if !status.is_success() {
            return Err(StudioError::Transport(format!("gemini HTTP {status}")));
        }

        let root: serde_json::Value = resp.json().await?;
        let text = root
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| StudioError::Transport("gemini response carried no text".into()))?
            .to_owned();

        Ok(single_chunk(text))
    }

    async fn submit_hf(&self, model: &str, prompt: &str) -> Result<ScriptStream, StudioError> {
        let url = format!("{HF_CHAT_URL_BASE}/{model}/v1/chat/completions");
        let body = json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": 1500,
            "response_format": {"type": "json_object"},
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.hf_token)
            .json(&body)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(StudioError::Transport(format!("{model} HTTP {status}")));
        }

        let root: serde_json::Value = resp.json().await?;
        let text = root
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .ok_or_else(|| StudioError::Transport(format!("{model} response carried no text")))?
            .to_owned();

        Ok(single_chunk(text))
    }
}

#[async_trait]
impl TextGenerationProvider for TextGenerationRouter {
    async fn submit(&self, topic: &Topic) -> Result<ScriptStream, StudioError> {
        let prompt = build_prompt(topic);
        let mut last_err = StudioError::Transport("no text generation provider configured".into());

        if !self.groq_key.is_empty() {
            match self.submit_groq(&prompt).await {
                Ok(stream) => {
                    logi("script stream via groq");
                    return Ok(stream);
                }
                Err(err) => {
                    logw(format!("groq failed: {err}"));
                    last_err = err;
                }
            }
        }

        if !self.gemini_key.is_empty() {
            match self.submit_gemini(&prompt).await {
                Ok(stream) => {
                    logi("script via gemini");
                    return Ok(stream);
                }
                Err(err) => {
                    logw(format!("gemini failed: {err}"));
                    last_err = err;
                }
            }
        }

        if !self.hf_token.is_empty() {
            for model in HF_FALLBACK_MODELS {
                match self.submit_hf(model, &prompt).await {
                    Ok(stream) => {
                        logi(format!("script via fallback model {model}"));
                        return Ok(stream);
                    }
                    Err(err) => {
                        logw(format!("{model} failed: {err}"));
                        last_err = err;
                    }
                }
            }
        }

        Err(last_err)
    }
}

fn single_chunk(text: String) -> ScriptStream {
    futures_util::stream::once(async move { Ok::<Bytes, StudioError>(Bytes::from(text)) }).boxed()
}

fn build_prompt(topic: &Topic) -> String {
    let language = if topic.language == "ar" {
        "Arabic"
    } else {
        "English"
    };
    format!(
        "Task: Generate a video production script in JSON format.\n\
         Topic: \"{}\"\n\
         Language: {}\n\n\
         Strict JSON Schema:\n\
         {{\n\
           \"scenes\": [\n\
             {{\n\
               \"script\": \"Narration text in {}\",\n\
               \"imagePrompt\": \"Detailed English image prompt\",\n\
               \"pexelsQuery\": \"3-5 English search keywords\",\n\
               \"cameraAngle\": \"Shot type\",\n\
               \"mood\": \"Emotional tone\"\n\
             }}\n\
           ]\n\
         }}\n\
         Exactly {} scenes. Output RAW JSON ONLY. No extra text.\n",
        topic.title, language, language, SCENES_PER_PRODUCTION
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::AspectRatio;

    #[test]
    fn prompt_names_topic_language_and_scene_count() {
        let prompt = build_prompt(&Topic {
            title: "volcanoes".into(),
            language: "en".into(),
            aspect: AspectRatio::Wide,
        });
        assert!(prompt.contains("\"volcanoes\""));
        assert!(prompt.contains("Language: English"));
        assert!(prompt.contains("Exactly 5 scenes"));
        assert!(prompt.contains("\"script\""));
    }
}
