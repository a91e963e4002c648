//! Error types for the sync engine.

use docsync_core::CoreError;
use docsync_protocol::{Conflict, DocumentId, Revision};
use docsync_remote::RemoteError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// The local store failed.
    #[error("local store error: {0}")]
    Store(#[from] CoreError),

    /// Replication left divergent leaves on a document.
    #[error("document {id} has conflicting revisions (winner {winner})")]
    Conflict {
        /// Document id.
        id: DocumentId,
        /// Winning revision.
        winner: Revision,
        /// Other live leaves.
        losers: Vec<Revision>,
    },

    /// The target refused a replicated revision.
    #[error("document {id} was rejected: {reason}")]
    Rejected {
        /// Document id.
        id: DocumentId,
        /// Reason given by the target.
        reason: String,
    },

    /// The engine already runs a session.
    #[error("a sync session is already running")]
    AlreadyStarted,

    /// No async runtime was available to run the session.
    #[error("no tokio runtime available")]
    NoRuntime,
}

impl SyncError {
    /// Returns true if this error can be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(err) => err.is_retryable(),
            SyncError::Store(_) => true,
            _ => false,
        }
    }

    /// Returns true if one document could not be read, as opposed to the
    /// store as a whole failing.
    #[must_use]
    pub fn is_unreadable_document(&self) -> bool {
        matches!(self, SyncError::Remote(RemoteError::Decode(_)))
    }

    /// Returns true if the remote rejected our credentials.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        matches!(self, SyncError::Remote(err) if err.is_auth())
    }
}

impl From<Conflict> for SyncError {
    fn from(conflict: Conflict) -> Self {
        SyncError::Conflict {
            id: conflict.id,
            winner: conflict.winner,
            losers: conflict.losers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::Remote(RemoteError::Network("down".into())).is_retryable());
        assert!(SyncError::Store(CoreError::InvalidDocument("x".into())).is_retryable());
        assert!(!SyncError::Remote(RemoteError::Unauthorized { status: 401 }).is_retryable());
        assert!(!SyncError::AlreadyStarted.is_retryable());
    }

    #[test]
    fn denied_errors() {
        assert!(SyncError::Remote(RemoteError::Unauthorized { status: 403 }).is_denied());
        assert!(SyncError::Remote(RemoteError::Unauthorized { status: 401 }).is_denied());
        assert!(!SyncError::Remote(RemoteError::Network("down".into())).is_denied());
    }

    #[test]
    fn decode_failures_are_per_document() {
        assert!(SyncError::Remote(RemoteError::Decode("bad status".into())).is_unreadable_document());
        assert!(!SyncError::Remote(RemoteError::Network("down".into())).is_unreadable_document());
    }

    #[test]
    fn conflict_display() {
        let err = SyncError::from(Conflict {
            id: DocumentId::new("a"),
            winner: Revision::new(2, "b"),
            losers: vec![Revision::new(2, "a")],
        });
        assert_eq!(err.to_string(), "document a has conflicting revisions (winner 2-b)");
    }
}
