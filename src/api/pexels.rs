use crate::api::{url_encode_component, StockKind, StockMediaProvider};
use crate::error::StudioError;
use crate::scene::AspectRatio;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const VIDEO_SEARCH_URL: &str = "https://api.pexels.com/videos/search";
const PHOTO_SEARCH_URL: &str = "https://api.pexels.com/v1/search";

pub struct PexelsClient {
    client: Client,
    key: String,
}

impl PexelsClient {
    pub fn new(client: Client, key: String) -> Self {
        PexelsClient { client, key }
    }
}

#[async_trait]
impl StockMediaProvider for PexelsClient {
    async fn search(
        &self,
        query: &str,
        kind: StockKind,
        aspect: AspectRatio,
    ) -> Result<Option<String>, StudioError> {
        if self.key.is_empty() || query.is_empty() {
            debug!("stock search skipped (no key or empty query)");
            return Ok(None);
        }

        let base = match kind {
            StockKind::Video => VIDEO_SEARCH_URL,
            StockKind::Photo => PHOTO_SEARCH_URL,
        };
        let url = format!(
            "{base}?query={}&orientation={}&size=medium&per_page=1",
            url_encode_component(query),
            aspect.orientation()
        );

        let resp = self
            .client
            .get(&url)
            .header("Authorization", &self.key)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(StudioError::RateLimit(format!("pexels HTTP {status}")));
        }
        if !status.is_success() {
            return Err(StudioError::Transport(format!("pexels HTTP {status}")));
        }

        let data: Value = resp.json().await?;
        let hit = match kind {
            StockKind::Photo => best_photo_url(&data),
            StockKind::Video => best_video_url(&data),
        };
        Ok(hit)
    }
}

fn best_photo_url(data: &Value) -> Option<String> {
    let src = data.get("photos")?.get(0)?.get("src")?;
    src.get("large2x")
        .and_then(Value::as_str)
        .or_else(|| src.get("large").and_then(Value::as_str))
        .map(str::to_owned)
}

fn best_video_url(data: &Value) -> Option<String> {
    let files = data.get("videos")?.get(0)?.get("video_files")?.as_array()?;
    let best = files
        .iter()
        .find(|f| f.get("quality").and_then(Value::as_str) == Some("hd"))
        .or_else(|| files.first())?;
    best.get("link").and_then(Value::as_str).map(str::to_owned)
}
