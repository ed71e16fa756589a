use thiserror::Error;

use passage_core::AuthError;

/// Store operation error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        AuthError::Store(value.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        StoreError::Serialization(value.to_string())
    }
}
