use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// No backend is configured; callers may fall back to deterministic output.
    #[error("Generation unavailable: {0}")]
    Unavailable(String),

    #[error("Chat API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Chat API rate limited, retry after {retry_after:?}s")]
    RateLimited { retry_after: Option<u64> },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid model output: {0}")]
    InvalidOutput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LlmError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

pub type LlmResult<T> = Result<T, LlmError>;
