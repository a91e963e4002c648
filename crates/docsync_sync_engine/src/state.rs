//! Replication session lifecycle.

use crate::event::SyncEvent;

/// Lifecycle state of a replication session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplicationState {
    /// Not started.
    #[default]
    Idle,
    /// Reaching the remote for the first time.
    Connecting,
    /// Transferring changes.
    Active,
    /// Idle. `errored` is set while backing off after a failure.
    Paused {
        /// Whether the pause follows an error.
        errored: bool,
    },
    /// Credentials were refused.
    Denied,
    /// A one-shot run finished.
    Complete,
    /// The session ended.
    Stopped,
}

impl ReplicationState {
    /// Returns the state after `event`.
    #[must_use]
    pub fn on_event(self, event: &SyncEvent) -> Self {
        if self == ReplicationState::Stopped {
            return self;
        }
        match event {
            SyncEvent::Connecting => ReplicationState::Connecting,
            SyncEvent::Active => ReplicationState::Active,
            SyncEvent::Paused(err) => ReplicationState::Paused {
                errored: err.is_some(),
            },
            SyncEvent::Denied(_) => ReplicationState::Denied,
            SyncEvent::Complete => ReplicationState::Complete,
            SyncEvent::Stopped => ReplicationState::Stopped,
            SyncEvent::Change(_)
            | SyncEvent::NetworkOnline
            | SyncEvent::NetworkOffline
            | SyncEvent::Conflict(_)
            | SyncEvent::Rejected { .. } => self,
        }
    }

    /// Returns true while the session is doing work.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, ReplicationState::Connecting | ReplicationState::Active)
    }

    /// Returns true once the session has ended.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        self == ReplicationState::Stopped
    }

    /// Returns true if the session is caught up and waiting.
    #[must_use]
    pub fn is_idle(self) -> bool {
        self == ReplicationState::Paused { errored: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use docsync_remote::RemoteError;
    use std::sync::Arc;

    #[test]
    fn lifecycle() {
        let state = ReplicationState::Idle
            .on_event(&SyncEvent::Connecting)
            .on_event(&SyncEvent::Active);
        assert!(state.is_active());

        let state = state.on_event(&SyncEvent::Paused(None));
        assert!(state.is_idle());

        let state = state.on_event(&SyncEvent::Paused(Some(Arc::new(SyncError::Remote(RemoteError::Network("down".into()))))));
        assert_eq!(state, ReplicationState::Paused { errored: true });
        assert!(!state.is_idle());
    }

    #[test]
    fn informational_events_keep_state() {
        let state = ReplicationState::Active;
        assert_eq!(state.on_event(&SyncEvent::NetworkOffline), ReplicationState::Active);
        assert_eq!(state.on_event(&SyncEvent::NetworkOnline), ReplicationState::Active);
    }

    #[test]
    fn stopped_is_terminal() {
        let state = ReplicationState::Active.on_event(&SyncEvent::Stopped);
        assert!(state.is_terminal());
        assert!(state.on_event(&SyncEvent::Active).is_terminal());
    }
}
