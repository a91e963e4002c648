//! Helpers for waiting on asynchronous conditions.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// Default patience for eventually-true conditions.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Polls `check` until it returns true or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Waits until the watched value satisfies `predicate`, panicking after `timeout`.
pub async fn wait_for_value<T, F>(rx: &mut watch::Receiver<T>, timeout: Duration, predicate: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    let value = tokio::time::timeout(timeout, rx.wait_for(predicate))
        .await
        .expect("Timed out waiting for value")
        .expect("Sender dropped while waiting");
    value.clone()
}

/// Runs `future` with [`DEFAULT_TIMEOUT`], panicking if it does not finish.
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(DEFAULT_TIMEOUT, future)
        .await
        .expect("Timed out")
}
