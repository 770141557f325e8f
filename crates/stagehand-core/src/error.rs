use thiserror::Error;

/// Top-level error type for the Stagehand system.
///
/// Subsystem crates define their own error types and implement
/// `From<StagehandError>` so that the `?` operator works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StagehandError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for StagehandError {
    fn from(err: toml::de::Error) -> Self {
        StagehandError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for StagehandError {
    fn from(err: toml::ser::Error) -> Self {
        StagehandError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for StagehandError {
    fn from(err: serde_json::Error) -> Self {
        StagehandError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Stagehand operations.
pub type Result<T> = std::result::Result<T, StagehandError>;
