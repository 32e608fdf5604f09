//! Error types for PMX

use thiserror::Error;

/// Result type alias for PMX operations
pub type Result<T> = std::result::Result<T, PmxError>;

/// Main error type shared by PMX crates
#[derive(Error, Debug)]
pub enum PmxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
