use thiserror::Error;

/// The universal error type for the Mingle client core.
#[derive(Error, Debug)]
pub enum MingleError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for Mingle core operations.
pub type Result<T> = std::result::Result<T, MingleError>;
