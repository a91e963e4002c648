//! # docsync sync engine
//!
//! Live, bidirectional replication between the local store and a remote
//! CouchDB-compatible database.
//!
//! A session pulls, then pushes, in batches until both sides are drained,
//! then waits for local writes, remote changes, or connectivity to come
//! back. Progress is published as an ordered stream of [`SyncEvent`]s,
//! folded into a [`SyncStatus`] that callers can poll or subscribe to.
//!
//! Transient failures pause the session with exponential backoff and are
//! retried indefinitely in live mode. Refused credentials end replication.
//! Conflicts are reported but never stop it.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod engine;
mod error;
mod event;
mod handle;
mod network;
mod replicator;
mod state;
mod status;

pub use config::{RetryConfig, SyncConfig};
pub use context::SyncContext;
pub use engine::{ReplicationSummary, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use event::{ChangeInfo, Direction, SyncEvent};
pub use handle::SyncHandle;
pub use network::NetworkMonitor;
pub use state::ReplicationState;
pub use status::SyncStatus;
