//! Error types for fieldsync-core

use thiserror::Error;

use crate::lifecycle::GuardViolation;

/// Result type alias using fieldsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fieldsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Task not found in the local store
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// Report not found in the local store
    #[error("Report not found: {0}")]
    ReportNotFound(String),

    /// A report transition was attempted while one of its guards is unmet
    #[error("{0}")]
    Guard(#[from] GuardViolation),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Missing or partial backend configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Remote store rejected or failed an operation
    #[error("Remote error: {0}")]
    Remote(String),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error came from talking to a backend rather than from local state.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Http(_))
    }
}
