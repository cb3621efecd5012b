use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(String),

    #[error("missing required config value: {0}")]
    Missing(&'static str),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
