//! Error types for docsync core.

use docsync_protocol::{DocumentId, Revision};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in local store operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Journal backend error.
    #[error("storage error: {0}")]
    Storage(#[from] docsync_storage::StorageError),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The document does not exist (or is deleted).
    #[error("document not found: {id}")]
    NotFound {
        /// The id that was looked up.
        id: DocumentId,
    },

    /// A write stated a revision that is not the current one.
    #[error("revision conflict on {id}: expected {expected:?}, current {actual:?}")]
    Conflict {
        /// The document written.
        id: DocumentId,
        /// Revision the write was based on.
        expected: Option<Revision>,
        /// Revision currently winning in the store.
        actual: Option<Revision>,
    },

    /// The document could not be accepted.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Another process owns the store directory.
    #[error("store at {path:?} is locked by another process")]
    Locked {
        /// Path of the locked journal.
        path: PathBuf,
    },
}

impl CoreError {
    /// Returns true if this is an optimistic-concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<docsync_protocol::ProtocolError> for CoreError {
    fn from(err: docsync_protocol::ProtocolError) -> Self {
        match err {
            docsync_protocol::ProtocolError::Json(e) => Self::Serialization(e),
            other => Self::InvalidDocument(other.to_string()),
        }
    }
}
