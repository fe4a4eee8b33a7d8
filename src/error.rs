//! Error taxonomy surfaced to pipeline callers.

use thiserror::Error;

/// Errors produced by the ingestion pipeline.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MonitorError {
    /// Credentials rejected, token payload malformed, or session expired.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network or HTTP failure, or a response missing the expected structure.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// A reading's runtime note does not carry a recognised duration.
    #[error("Unparsable runtime note: {note:?}")]
    UnparsableNote { note: String },

    /// A reading whose zone cannot be identified.
    #[error("Malformed reading: {0}")]
    MalformedReading(String),

    /// Backup, read, write or rename failure in the history store.
    #[error("Storage I/O failed: {0}")]
    StorageIo(String),

    /// Invalid settings or credentials.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl MonitorError {
    pub(crate) fn storage(err: anyhow::Error) -> Self {
        MonitorError::StorageIo(format!("{err:#}"))
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, MonitorError>;
