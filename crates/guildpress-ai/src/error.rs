use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("model response is not valid JSON: {excerpt}")]
    BadResponse { excerpt: String },

    #[error("response failed validation: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown prompt template: {0}")]
    UnknownTemplate(String),

    #[error("failed to read template {name}: {source}")]
    Template {
        name: String,
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl AiError {
    /// Transient errors worth another attempt: rate limiting, server
    /// hiccups, and connection-level failures. Everything else is
    /// semantic and propagates immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            AiError::Api { status, .. } => matches!(status, 429 | 500 | 503),
            AiError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AiError>;
