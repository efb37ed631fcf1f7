//! Error types for daybook.

use thiserror::Error;

/// Errors that can occur in daybook operations.
#[derive(Error, Debug)]
pub enum DaybookError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("Remote operation failed: {0}")]
    RemoteOperationFailed(String),

    #[error("Document '{0}' belongs to another user")]
    NotOwned(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DaybookError {
    fn from(e: serde_json::Error) -> Self {
        DaybookError::Serialization(e.to_string())
    }
}

/// Result type alias for daybook operations.
pub type DaybookResult<T> = Result<T, DaybookError>;
