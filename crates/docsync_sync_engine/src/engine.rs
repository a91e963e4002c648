//! Replication sessions between the local store and a remote.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::event::{ChangeInfo, Direction, SyncEvent};
use crate::handle::SyncHandle;
use crate::network::NetworkMonitor;
use crate::replicator::{self, Transfer};
use crate::state::ReplicationState;
use crate::status::SyncStatus;
use docsync_core::LocalStore;
use docsync_protocol::{Conflict, DocumentId, Feed};
use docsync_remote::RemoteStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const POLL_ERROR_PAUSE: Duration = Duration::from_secs(1);

/// Totals of one replication pass in both directions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationSummary {
    /// Revisions written to the local store.
    pub pulled: usize,
    /// Revisions written to the remote.
    pub pushed: usize,
    /// Documents left with divergent leaves.
    pub conflicts: Vec<Conflict>,
    /// Revisions the target refused, with the reason.
    pub rejected: Vec<(DocumentId, String)>,
}

impl ReplicationSummary {
    /// Total revisions written in both directions.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pulled + self.pushed
    }
}

/// Bidirectional replication between a [`LocalStore`] and a remote.
///
/// An engine runs at most one session. [`start`](Self::start) spawns it on
/// the current tokio runtime; [`replicate_once`](Self::replicate_once) runs
/// a single pass inline without emitting events.
pub struct SyncEngine {
    inner: Arc<Inner>,
    started: AtomicBool,
}

struct Inner {
    local: Arc<LocalStore>,
    remote: Arc<dyn RemoteStore>,
    network: NetworkMonitor,
    config: SyncConfig,
    pull_key: String,
    push_key: String,
}

impl SyncEngine {
    /// Creates an engine. Nothing runs until a session is started.
    #[must_use]
    pub fn new(
        local: Arc<LocalStore>,
        remote: Arc<dyn RemoteStore>,
        network: NetworkMonitor,
        config: SyncConfig,
    ) -> Self {
        let identifier = remote.identifier();
        Self {
            inner: Arc::new(Inner {
                pull_key: format!("{}:{identifier}", Direction::Pull),
                push_key: format!("{}:{identifier}", Direction::Push),
                local,
                remote,
                network,
                config,
            }),
            started: AtomicBool::new(false),
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Returns true once a session has been started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Runs one pull and one push pass until both sides are drained.
    ///
    /// # Errors
    ///
    /// Returns the first error from either store.
    pub async fn replicate_once(&self) -> SyncResult<ReplicationSummary> {
        self.inner.connect_and_cycle(true, &Emitter::silent()).await
    }

    /// Starts the replication session.
    ///
    /// `on_change` hears about applied batches and completion. `on_error`
    /// hears about failures, refused credentials, conflicts and rejected
    /// revisions. Both run on one task, in event order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::AlreadyStarted`] on a second call and
    /// [`SyncError::NoRuntime`] outside a tokio runtime.
    pub fn start<C, E>(&self, on_change: C, on_error: E) -> SyncResult<SyncHandle>
    where
        C: Fn(&SyncEvent) + Send + 'static,
        E: Fn(&SyncError) + Send + 'static,
    {
        tokio::runtime::Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SyncError::AlreadyStarted);
        }

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(SyncStatus::default());
        let (state_tx, state_rx) = watch::channel(ReplicationState::Idle);
        let events = Arc::new(Emitter::new(tx));
        let online = Arc::new(Notify::new());

        tokio::spawn(project(rx, status_tx, state_tx, on_change, on_error));

        info!(
            remote = %self.inner.remote.identifier(),
            live = self.inner.config.live,
            "starting replication"
        );
        events.emit(SyncEvent::Connecting);

        let listener = tokio::spawn(forward_network(
            self.inner.network.clone(),
            Arc::clone(&events),
            Arc::clone(&online),
            cancel.clone(),
        ));
        let probe = self.inner.config.probe_interval.map(|interval| {
            self.inner
                .network
                .probe(Arc::clone(&self.inner.remote), interval, cancel.clone())
        });

        let inner = Arc::clone(&self.inner);
        let session = cancel.clone();
        tokio::spawn(async move {
            if inner.config.live {
                inner.run_live(&events, &online, &session).await;
            } else {
                inner.run_once(&events, &session).await;
            }
            session.cancel();
            let _ = listener.await;
            if let Some(probe) = probe {
                let _ = probe.await;
            }
            events.emit(SyncEvent::Stopped);
            info!("replication stopped");
        });

        Ok(SyncHandle::new(cancel, status_rx, state_rx))
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("remote", &self.inner.remote.identifier())
            .field("config", &self.inner.config)
            .field("started", &self.is_started())
            .finish()
    }
}

impl Inner {
    fn checkpoint_key(&self, direction: Direction) -> &str {
        match direction {
            Direction::Pull => &self.pull_key,
            Direction::Push => &self.push_key,
        }
    }

    async fn connect_and_cycle(
        &self,
        ensure_database: bool,
        events: &Emitter,
    ) -> SyncResult<ReplicationSummary> {
        if ensure_database {
            self.remote.ensure_database().await?;
        }
        let mut summary = ReplicationSummary::default();
        self.replicate(Direction::Pull, events, &mut summary).await?;
        self.replicate(Direction::Push, events, &mut summary).await?;
        Ok(summary)
    }

    async fn replicate(
        &self,
        direction: Direction,
        events: &Emitter,
        summary: &mut ReplicationSummary,
    ) -> SyncResult<()> {
        let key = self.checkpoint_key(direction);
        let batch_size = self.config.batch_size;
        let local = self.local.as_ref();
        let remote = self.remote.as_ref();

        loop {
            let since = self.local.checkpoint(key).unwrap_or_default();
            let plan = match direction {
                Direction::Pull => replicator::plan(remote, local, &since, batch_size).await?,
                Direction::Push => replicator::plan(local, remote, &since, batch_size).await?,
            };

            if plan.has_work() || events.state() == ReplicationState::Connecting {
                events.activate();
            }
            let transfer = if plan.has_work() {
                match direction {
                    Direction::Pull => replicator::transfer(remote, local, &plan.missing).await?,
                    Direction::Push => replicator::transfer(local, remote, &plan.missing).await?,
                }
            } else {
                Transfer::default()
            };

            let read = plan.page.results.len();
            if plan.page.last_seq != since {
                self.local.set_checkpoint(key, &plan.page.last_seq)?;
            }

            if transfer.written > 0 {
                debug!(%direction, read, written = transfer.written, "applied batch");
                events.emit(SyncEvent::Change(ChangeInfo {
                    direction,
                    docs_read: read,
                    docs_written: transfer.written,
                    last_seq: plan.page.last_seq.clone(),
                }));
            }
            match direction {
                Direction::Pull => summary.pulled += transfer.written,
                Direction::Push => summary.pushed += transfer.written,
            }
            for conflict in transfer.conflicts {
                warn!(id = %conflict.id, winner = %conflict.winner, "conflicting revisions");
                events.emit(SyncEvent::Conflict(conflict.clone()));
                summary.conflicts.push(conflict);
            }
            for (id, reason) in transfer.rejected {
                events.emit(SyncEvent::Rejected {
                    id: id.clone(),
                    reason: reason.clone(),
                });
                summary.rejected.push((id, reason));
            }

            if read == 0 || plan.page.is_drained(batch_size) {
                return Ok(());
            }
        }
    }

    async fn run_live(&self, events: &Emitter, online: &Notify, cancel: &CancellationToken) {
        let mut local_updates = self.local.subscribe();
        let mut connected = false;
        let mut attempt = 0u32;

        loop {
            local_updates.borrow_and_update();
            let result = tokio::select! {
                () = cancel.cancelled() => return,
                result = self.connect_and_cycle(!connected, events) => result,
            };

            match result {
                Ok(summary) => {
                    connected = true;
                    attempt = 0;
                    if summary.total() > 0 {
                        debug!(pulled = summary.pulled, pushed = summary.pushed, "caught up");
                    }
                    events.settle();

                    let woken = tokio::select! {
                        () = cancel.cancelled() => false,
                        Ok(()) = local_updates.changed() => true,
                        () = self.remote_activity() => true,
                        () = online.notified() => true,
                    };
                    if !woken {
                        return;
                    }
                }
                Err(err) if err.is_denied() => {
                    warn!(error = %err, "remote denied replication");
                    events.emit(SyncEvent::Denied(Arc::new(err)));
                    cancel.cancelled().await;
                    return;
                }
                Err(err) => {
                    attempt = attempt.saturating_add(1);
                    let delay = self.config.retry.delay_for_attempt(attempt);
                    warn!(error = %err, attempt, ?delay, "replication paused");
                    events.emit(SyncEvent::Paused(Some(Arc::new(err))));

                    tokio::select! {
                        () = cancel.cancelled() => return,
                        () = tokio::time::sleep(delay) => {}
                        () = online.notified() => attempt = 0,
                    }
                }
            }
        }
    }

    async fn run_once(&self, events: &Emitter, cancel: &CancellationToken) {
        let attempts = self.config.retry.max_attempts.max(1);

        for attempt in 0..attempts {
            let delay = self.config.retry.delay_for_attempt(attempt);
            let result = tokio::select! {
                () = cancel.cancelled() => {
                    events.emit(SyncEvent::Complete);
                    return;
                }
                result = async {
                    tokio::time::sleep(delay).await;
                    self.connect_and_cycle(true, events).await
                } => result,
            };

            match result {
                Ok(summary) => {
                    info!(pulled = summary.pulled, pushed = summary.pushed, "replication complete");
                    events.emit(SyncEvent::Complete);
                    return;
                }
                Err(err) if err.is_denied() => {
                    warn!(error = %err, "remote denied replication");
                    events.emit(SyncEvent::Denied(Arc::new(err)));
                    return;
                }
                Err(err) => {
                    let retry = err.is_retryable() && attempt + 1 < attempts;
                    warn!(error = %err, attempt, retry, "replication failed");
                    events.emit(SyncEvent::Paused(Some(Arc::new(err))));
                    if !retry {
                        return;
                    }
                }
            }
        }
    }

    /// Resolves once the remote reports a change past the pull checkpoint,
    /// or fails.
    async fn remote_activity(&self) {
        let since = self.local.checkpoint(&self.pull_key).unwrap_or_default();
        let timeout = self.config.poll_timeout;
        loop {
            let started = Instant::now();
            match self.remote.changes(&since, 1, Feed::LongPoll(timeout)).await {
                Ok(page) if page.results.is_empty() => {
                    // Servers that ignore the long-poll must not spin us.
                    if started.elapsed() < timeout / 2 {
                        tokio::time::sleep(timeout).await;
                    }
                }
                Ok(_) => return,
                Err(err) => {
                    debug!(error = %err, "remote poll failed");
                    tokio::time::sleep(timeout.min(POLL_ERROR_PAUSE)).await;
                    return;
                }
            }
        }
    }
}

async fn forward_network(
    network: NetworkMonitor,
    events: Arc<Emitter>,
    online: Arc<Notify>,
    cancel: CancellationToken,
) {
    let mut updates = network.subscribe();
    if !*updates.borrow_and_update() {
        events.emit(SyncEvent::NetworkOffline);
    }
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            changed = updates.changed() => {
                if changed.is_err() {
                    return;
                }
                if *updates.borrow_and_update() {
                    events.emit(SyncEvent::NetworkOnline);
                    online.notify_one();
                } else {
                    events.emit(SyncEvent::NetworkOffline);
                }
            }
        }
    }
}

async fn project<C, E>(
    mut events: mpsc::UnboundedReceiver<SyncEvent>,
    status: watch::Sender<SyncStatus>,
    state: watch::Sender<ReplicationState>,
    on_change: C,
    on_error: E,
) where
    C: Fn(&SyncEvent),
    E: Fn(&SyncError),
{
    while let Some(event) = events.recv().await {
        status.send_if_modified(|current| {
            let next = current.apply(&event);
            let changed = next != *current;
            *current = next;
            changed
        });
        if event.is_progress() {
            on_change(&event);
        }
        if let Some(err) = event.error() {
            on_error(&err);
        }
        state.send_if_modified(|current| {
            let next = current.on_event(&event);
            let changed = next != *current;
            *current = next;
            changed
        });
    }
}

/// Orders events from the session tasks into one stream.
struct Emitter {
    tx: Option<mpsc::UnboundedSender<SyncEvent>>,
    inner: Mutex<EmitterState>,
}

#[derive(Default)]
struct EmitterState {
    state: ReplicationState,
    // A network flip since the last idle report makes that report stale.
    stale: bool,
}

impl Emitter {
    fn new(tx: mpsc::UnboundedSender<SyncEvent>) -> Self {
        Self {
            tx: Some(tx),
            inner: Mutex::new(EmitterState::default()),
        }
    }

    fn silent() -> Self {
        Self {
            tx: None,
            inner: Mutex::new(EmitterState::default()),
        }
    }

    fn emit(&self, event: SyncEvent) {
        let mut inner = self.inner.lock();
        inner.state = inner.state.on_event(&event);
        match event {
            SyncEvent::NetworkOnline | SyncEvent::NetworkOffline => inner.stale = true,
            SyncEvent::Paused(None) => inner.stale = false,
            _ => {}
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    fn state(&self) -> ReplicationState {
        self.inner.lock().state
    }

    fn activate(&self) {
        if self.state() != ReplicationState::Active {
            self.emit(SyncEvent::Active);
        }
    }

    fn settle(&self) {
        let needed = {
            let inner = self.inner.lock();
            !inner.state.is_idle() || inner.stale
        };
        if needed {
            self.emit(SyncEvent::Paused(None));
        }
    }
}
