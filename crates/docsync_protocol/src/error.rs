//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while parsing or building protocol values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A revision string is not of the form `{generation}-{hash}`.
    #[error("invalid revision: {0:?}")]
    InvalidRevision(String),

    /// A document failed validation.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
