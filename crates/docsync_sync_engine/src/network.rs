//! Connectivity tracking.

use docsync_remote::{RemoteError, RemoteStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Shared view of whether the network is reachable.
///
/// Platform code reports connectivity with [`set_online`](Self::set_online);
/// [`probe`](Self::probe) can infer it from remote pings instead.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkMonitor {
    /// Creates a monitor with the given initial state.
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Reports connectivity. Repeated reports of the same state are ignored.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            debug!(online, "network state changed");
        }
    }

    /// Returns the current connectivity.
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Subscribes to connectivity changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Pings `remote` every `interval` until `cancel` fires.
    ///
    /// Transport failures mark the network offline. Any answer from the
    /// server, including an error status, marks it online.
    pub fn probe(
        &self,
        remote: Arc<dyn RemoteStore>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let monitor = self.clone();
        tokio::spawn(async move {
            loop {
                let online = !matches!(remote.ping().await, Err(RemoteError::Network(_)));
                monitor.set_online(online);
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(interval) => {}
                }
            }
        })
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_remote::MemoryRemote;

    #[test]
    fn repeated_reports_are_ignored() {
        let monitor = NetworkMonitor::new(true);
        let mut rx = monitor.subscribe();
        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());

        monitor.set_online(false);
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn reachability_follows_the_remote() {
        let remote = Arc::new(MemoryRemote::default());
        let monitor = NetworkMonitor::new(true);
        let cancel = CancellationToken::new();
        let mut rx = monitor.subscribe();

        remote.set_offline(true);
        let task = monitor.probe(remote.clone(), Duration::from_millis(10), cancel.clone());
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|online| !online))
            .await
            .unwrap()
            .unwrap();

        remote.set_offline(false);
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|online| *online))
            .await
            .unwrap()
            .unwrap();

        cancel.cancel();
        task.await.unwrap();
    }
}
