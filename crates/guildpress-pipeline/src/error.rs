use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(#[from] guildpress_store::StoreError),

    #[error("AI error: {0}")]
    Ai(#[from] guildpress_ai::AiError),

    #[error("unknown stage: {0}")]
    UnknownStage(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
