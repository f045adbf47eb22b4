use thiserror::Error;

/// Failure taxonomy for the production pipeline. Most variants are handled
/// locally by a fallback chain; only script exhaustion and composition
/// failures ever reach the user.
#[derive(Debug, Error)]
pub enum StudioError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("malformed scene object: {0}")]
    Parse(String),

    #[error("asset not found: {0}")]
    AssetNotFound(String),

    #[error("narration synthesis failed: {0}")]
    Synthesis(String),

    #[error("composition failed: {0}")]
    Composition(String),
}

impl From<reqwest::Error> for StudioError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16() == 429).unwrap_or(false) {
            StudioError::RateLimit(err.to_string())
        } else {
            StudioError::Transport(err.to_string())
        }
    }
}
