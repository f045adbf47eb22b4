use crate::api::{url_encode_component, NarrationProvider, Synthesis};
use crate::error::StudioError;
use crate::scene::WordTiming;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

/// Word-boundary offsets arrive in 100 ns ticks.
const TICKS_PER_MS: u64 = 10_000;
const SYNTH_TIMEOUT_SECS: u64 = 300;

const TRANSLATE_TTS_URL: &str = "https://translate.google.com/translate_tts";
/// The fallback endpoint rejects long inputs; chunk at word boundaries.
const CHUNK_MAX_CHARS: usize = 180;
const TRANSLATE_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Primary narration: a TTS sidecar that streams audio and reports
/// word-boundary metadata alongside it.
pub struct WordBoundaryTts {
    client: Client,
    base: String,
}

impl WordBoundaryTts {
    pub fn new(client: Client, base: String) -> Self {
        WordBoundaryTts { client, base }
    }
}

#[async_trait]
impl NarrationProvider for WordBoundaryTts {
    fn name(&self) -> &'static str {
        "word-boundary tts"
    }

    fn stream_reference(&self, text: &str, voice: &str) -> String {
        format!(
            "{}/stream?voice={}&text={}",
            self.base,
            url_encode_component(voice),
            url_encode_component(text)
        )
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<Synthesis, StudioError> {
        let meta_url = format!("{}/synthesize", self.base);
        let body = json!({ "text": text, "voice": voice, "metadata": true });

        let resp = self
            .client
            .post(&meta_url)
            .json(&body)
            .timeout(Duration::from_secs(SYNTH_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|err| StudioError::Synthesis(err.to_string()))?;

        if !resp.status().is_success() {
            return Err(StudioError::Synthesis(format!(
                "metadata HTTP {}",
                resp.status()
            )));
        }

        let meta: Value = resp
            .json()
            .await
            .map_err(|err| StudioError::Synthesis(err.to_string()))?;
        let timings = parse_word_boundaries(&meta);

        let audio_resp = self
            .client
            .get(self.stream_reference(text, voice))
            .timeout(Duration::from_secs(SYNTH_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|err| StudioError::Synthesis(err.to_string()))?;
        if !audio_resp.status().is_success() {
            return Err(StudioError::Synthesis(format!(
                "audio HTTP {}",
                audio_resp.status()
            )));
        }
        let audio = audio_resp
            .bytes()
            .await
            .map_err(|err| StudioError::Synthesis(err.to_string()))?;

        Ok(Synthesis { audio, timings })
    }
}

fn parse_word_boundaries(meta: &Value) -> Option<Vec<WordTiming>> {
    let words = meta.get("words")?.as_array()?;
    let mut timings: Vec<WordTiming> = words
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let ticks = entry.get("offset")?.as_u64()?;
            Some(WordTiming {
                index,
                onset_ms: ticks / TICKS_PER_MS,
            })
        })
        .collect();

    if timings.is_empty() {
        return None;
    }
    timings.sort_by_key(|t| t.onset_ms);
    Some(timings)
}

/// Degraded fallback: no word metadata, but always reachable.
pub struct TranslateTts {
    client: Client,
    lang: String,
}

impl TranslateTts {
    pub fn new(client: Client, lang: String) -> Self {
        TranslateTts { client, lang }
    }

    fn chunk_url(&self, chunk: &str) -> String {
        format!(
            "{TRANSLATE_TTS_URL}?ie=UTF-8&q={}&tl={}&client=tw-ob&ttsspeed=1.4",
            url_encode_component(chunk),
            self.lang
        )
    }
}

#[async_trait]
impl NarrationProvider for TranslateTts {
    fn name(&self) -> &'static str {
        "translate tts"
    }

    fn stream_reference(&self, text: &str, _voice: &str) -> String {
        self.chunk_url(text)
    }

    async fn synthesize(&self, text: &str, _voice: &str) -> Result<Synthesis, StudioError> {
        let mut audio = Vec::new();
        for chunk in split_text(text, CHUNK_MAX_CHARS) {
            let resp = self
                .client
                .get(self.chunk_url(&chunk))
                .header("User-Agent", TRANSLATE_USER_AGENT)
                .header("Referer", "https://translate.google.com/")
                .timeout(Duration::from_secs(60))
                .send()
                .await
                .map_err(|err| StudioError::Synthesis(err.to_string()))?;

            if !resp.status().is_success() {
                return Err(StudioError::Synthesis(format!(
                    "translate tts HTTP {}",
                    resp.status()
                )));
            }
            let bytes = resp
                .bytes()
                .await
                .map_err(|err| StudioError::Synthesis(err.to_string()))?;
            audio.extend_from_slice(&bytes);
        }

        Ok(Synthesis {
            audio: Bytes::from(audio),
            timings: None,
        })
    }
}

/// Word-boundary chunking; a single oversized word becomes its own chunk.
fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate_len = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if candidate_len <= max_chars {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        } else {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
