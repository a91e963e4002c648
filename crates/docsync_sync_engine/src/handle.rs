//! Handle to a running replication session.

use crate::state::ReplicationState;
use crate::status::SyncStatus;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Controls and observes a running session.
///
/// Dropping the handle cancels the session.
#[derive(Debug)]
pub struct SyncHandle {
    cancel: CancellationToken,
    status: watch::Receiver<SyncStatus>,
    state: watch::Receiver<ReplicationState>,
}

impl SyncHandle {
    pub(crate) fn new(
        cancel: CancellationToken,
        status: watch::Receiver<SyncStatus>,
        state: watch::Receiver<ReplicationState>,
    ) -> Self {
        Self {
            cancel,
            status,
            state,
        }
    }

    /// Stops the session. Calling it again has no effect.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ReplicationState {
        *self.state.borrow()
    }

    /// Subscribes to status changes.
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Subscribes to lifecycle changes.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ReplicationState> {
        self.state.clone()
    }

    /// Waits until the session has stopped and every callback has run.
    pub async fn stopped(&self) {
        wait_stopped(self.state.clone()).await;
    }

    pub(crate) fn watcher(&self) -> SessionWatcher {
        SessionWatcher {
            cancel: self.cancel.clone(),
            state: self.state.clone(),
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Lets an owner stop a session it handed out.
#[derive(Debug)]
pub(crate) struct SessionWatcher {
    cancel: CancellationToken,
    state: watch::Receiver<ReplicationState>,
}

impl SessionWatcher {
    pub async fn stop(self) {
        self.cancel.cancel();
        wait_stopped(self.state).await;
    }
}

async fn wait_stopped(mut state: watch::Receiver<ReplicationState>) {
    // A closed channel means the projection already finished.
    let _ = state.wait_for(|state| state.is_terminal()).await;
}
