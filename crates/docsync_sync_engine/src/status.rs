//! User-facing sync status.

use crate::event::SyncEvent;

/// Observable summary of a replication session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    /// Whether the network is believed reachable.
    pub online: bool,
    /// Whether changes are being transferred right now.
    pub syncing: bool,
    /// Whether both sides are known to have converged.
    pub up_to_date: bool,
    /// Message of the most recent error, until replication recovers.
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            online: true,
            syncing: false,
            up_to_date: false,
            last_error: None,
        }
    }
}

impl SyncStatus {
    /// Returns the status after `event`.
    #[must_use]
    pub fn apply(&self, event: &SyncEvent) -> SyncStatus {
        let mut next = self.clone();
        match event {
            SyncEvent::Connecting => {
                next.syncing = false;
                next.up_to_date = false;
            }
            SyncEvent::Active => {
                next.syncing = true;
                next.up_to_date = false;
            }
            SyncEvent::Paused(None) => {
                next.syncing = false;
                next.up_to_date = next.online;
                next.last_error = None;
            }
            SyncEvent::Paused(Some(err)) | SyncEvent::Denied(err) => {
                next.syncing = false;
                next.up_to_date = false;
                next.last_error = Some(err.to_string());
            }
            SyncEvent::Complete => {
                next.syncing = false;
                next.up_to_date = true;
                next.last_error = None;
            }
            SyncEvent::Stopped => {
                next.syncing = false;
            }
            SyncEvent::NetworkOffline => {
                next.online = false;
                next.up_to_date = false;
            }
            SyncEvent::NetworkOnline => {
                next.online = true;
            }
            SyncEvent::Change(_) | SyncEvent::Conflict(_) | SyncEvent::Rejected { .. } => {}
        }
        next
    }
}
