//! Error types for the tag store.

use thiserror::Error;

/// Result type alias for tag store operations.
pub type TagResult<T> = Result<T, TagError>;

/// Errors that can occur during tag store operations.
#[derive(Debug, Error)]
pub enum TagError {
    /// A required argument was empty. Never reaches the backing store.
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),
}

impl TagError {
    pub fn is_validation(&self) -> bool {
        matches!(self, TagError::MissingField(_) | TagError::InvalidField { .. })
    }
}
