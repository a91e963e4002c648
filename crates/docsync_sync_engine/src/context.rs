//! Application-level wiring of the local store, submissions and sync.

use crate::config::SyncConfig;
use crate::engine::{ReplicationSummary, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::event::SyncEvent;
use crate::handle::{SessionWatcher, SyncHandle};
use crate::network::NetworkMonitor;
use docsync_core::{LocalStore, StoreConfig, Submissions};
use docsync_remote::RemoteStore;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

/// Everything an application needs to work offline and replicate.
///
/// Owns the local store, the submissions API over it, and one live sync
/// session against the configured remote.
pub struct SyncContext {
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    network: NetworkMonitor,
    submissions: Submissions,
    engine: SyncEngine,
    session: Mutex<Option<SessionWatcher>>,
}

impl SyncContext {
    /// Wires a context from its parts. Live mode is always on.
    #[must_use]
    pub fn new(
        local: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        network: NetworkMonitor,
        config: SyncConfig,
    ) -> Self {
        let engine = SyncEngine::new(
            Arc::clone(&local),
            Arc::clone(&remote),
            network.clone(),
            config.with_live(true),
        );
        Self {
            submissions: Submissions::new(Arc::clone(&local)),
            local,
            remote,
            network,
            engine,
            session: Mutex::new(None),
        }
    }

    /// Opens the local store under `dir` and wires a context around it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be opened or is locked.
    pub fn open(
        dir: &Path,
        remote: Arc<dyn RemoteStore>,
        store_config: StoreConfig,
        config: SyncConfig,
    ) -> SyncResult<Self> {
        let local = Arc::new(LocalStore::open(dir, store_config)?);
        Ok(Self::new(local, remote, NetworkMonitor::default(), config))
    }

    /// The submissions API over the local store.
    #[must_use]
    pub fn submissions(&self) -> &Submissions {
        &self.submissions
    }

    /// The local store.
    #[must_use]
    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    /// The remote store.
    #[must_use]
    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// The connectivity monitor fed to the sync session.
    #[must_use]
    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// Starts the live sync session.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyStarted`] if a session was started before.
    pub fn start_live_sync<C, E>(&self, on_change: C, on_error: E) -> SyncResult<SyncHandle>
    where
        C: Fn(&SyncEvent) + Send + 'static,
        E: Fn(&SyncError) + Send + 'static,
    {
        let handle = self.engine.start(on_change, on_error)?;
        *self.session.lock() = Some(handle.watcher());
        Ok(handle)
    }

    /// Runs one replication pass without starting a session.
    ///
    /// # Errors
    ///
    /// Returns the first error from either store.
    pub async fn sync_once(&self) -> SyncResult<ReplicationSummary> {
        self.engine.replicate_once().await
    }

    /// Stops the session, if any, and flushes the local store.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub async fn close(&self) -> SyncResult<()> {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.stop().await;
        }
        self.local.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("remote", &self.remote.identifier())
            .field("documents", &self.local.document_count())
            .finish_non_exhaustive()
    }
}
