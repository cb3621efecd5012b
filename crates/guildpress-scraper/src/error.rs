use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Discord connect timed out after {secs}s")]
    ConnectTimeout { secs: u64 },

    #[error("Discord API error: {0}")]
    Discord(#[from] serenity::Error),

    #[error("invalid snowflake id: {0}")]
    InvalidId(String),

    #[error("store error: {0}")]
    Store(#[from] guildpress_store::StoreError),

    #[error("scrape cancelled")]
    Cancelled,

    #[error("{0}")]
    Source(String),
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
