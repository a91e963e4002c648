//! Events emitted by a replication session.

use crate::error::SyncError;
use docsync_protocol::{Conflict, DocumentId, Sequence};
use std::fmt;
use std::sync::Arc;

/// Direction of a replication batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Remote to local.
    Pull,
    /// Local to remote.
    Push,
}

impl Direction {
    /// Checkpoint key prefix for this direction.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Pull => "pull",
            Direction::Push => "push",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one applied batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeInfo {
    /// Which way the batch went.
    pub direction: Direction,
    /// Changes read from the source.
    pub docs_read: usize,
    /// Revisions written to the target.
    pub docs_written: usize,
    /// Source sequence the checkpoint now points at.
    pub last_seq: Sequence,
}

/// Something that happened during a replication session.
///
/// Events reach observers in the order they were emitted.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The session is reaching the remote for the first time.
    Connecting,
    /// Changes are being transferred.
    Active,
    /// A batch was applied.
    Change(ChangeInfo),
    /// Replication is idle, either caught up or backing off after an error.
    Paused(Option<Arc<SyncError>>),
    /// The remote refused our credentials. The session does not retry.
    Denied(Arc<SyncError>),
    /// A one-shot run finished.
    Complete,
    /// The session ended. Nothing follows this event.
    Stopped,
    /// Connectivity came back.
    NetworkOnline,
    /// Connectivity was lost.
    NetworkOffline,
    /// A document was left with divergent leaves.
    Conflict(Conflict),
    /// The target refused a replicated revision.
    Rejected {
        /// Document id.
        id: DocumentId,
        /// Reason given by the target.
        reason: String,
    },
}

impl SyncEvent {
    /// Returns the error an observer should hear about, if any.
    #[must_use]
    pub fn error(&self) -> Option<Arc<SyncError>> {
        match self {
            SyncEvent::Paused(Some(err)) | SyncEvent::Denied(err) => Some(Arc::clone(err)),
            SyncEvent::Conflict(conflict) => Some(Arc::new(SyncError::from(conflict.clone()))),
            SyncEvent::Rejected { id, reason } => Some(Arc::new(SyncError::Rejected {
                id: id.clone(),
                reason: reason.clone(),
            })),
            _ => None,
        }
    }

    /// Returns true for events reported to change observers.
    #[must_use]
    pub fn is_progress(&self) -> bool {
        matches!(self, SyncEvent::Change(_) | SyncEvent::Complete)
    }
}
