use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid entity type: {0:?}")]
    InvalidEntityType(String),

    #[error("Invalid extraction source: {0}")]
    InvalidSource(String),

    #[error("Self-referential relationship not allowed: {0}")]
    SelfReference(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] crate::extract::ExtractionError),

    #[error("Validator error: {0}")]
    Validator(#[from] crate::validator::ValidatorError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
