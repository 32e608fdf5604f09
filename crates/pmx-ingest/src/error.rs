//! Ingest error types
//!
//! Every variant maps to one row of the failure policy: file-level errors
//! abort a single file, document-level errors drop one document, and only
//! startup errors reach the binary.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("IO error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File '{path}' did not stabilize within {timeout:?}")]
    StabilizationTimeout { path: PathBuf, timeout: Duration },

    #[error("XML read error at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Unparseable collection end time '{value}': {source}")]
    EndTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Reference store error: {0}")]
    Reference(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Common error: {0}")]
    Common(#[from] pmx_common::PmxError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("{0} queue closed")]
    QueueClosed(&'static str),

    #[error("Task for '{path}' failed to complete: {reason}")]
    TaskAborted { path: PathBuf, reason: String },
}

impl IngestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::Io {
            path: path.into(),
            source,
        }
    }
}
