//! Sync command implementation.

use super::RemoteArgs;
use docsync_core::StoreConfig;
use docsync_sync_engine::{SyncConfig, SyncContext, SyncEvent};
use std::future::Future;
use std::path::Path;
use tracing::{error, info, warn};

/// Runs the sync command.
pub async fn run(
    path: &Path,
    remote: &RemoteArgs,
    once: bool,
    batch_size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = remote.connect()?;
    let config = SyncConfig::new().with_batch_size(batch_size);
    let context = SyncContext::open(path, client, StoreConfig::default(), config)?;
    info!(path = %path.display(), remote = %context.remote().identifier(), "store opened");

    let result = if once {
        sync_once(&context).await
    } else {
        sync_live(&context, shutdown_signal()).await
    };
    context.close().await?;
    result
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Runs a single replication pass and prints what moved.
pub async fn sync_once(context: &SyncContext) -> Result<(), Box<dyn std::error::Error>> {
    let summary = context.sync_once().await?;
    println!("Pulled:    {}", summary.pulled);
    println!("Pushed:    {}", summary.pushed);
    println!("Conflicts: {}", summary.conflicts.len());
    for conflict in &summary.conflicts {
        println!("  {} ({} losing leaves)", conflict.id, conflict.losers.len());
    }
    for (id, reason) in &summary.rejected {
        println!("  rejected {id}: {reason}");
    }
    Ok(())
}

/// Runs a live session until `shutdown` resolves.
pub async fn sync_live<F>(context: &SyncContext, shutdown: F) -> Result<(), Box<dyn std::error::Error>>
where
    F: Future<Output = ()>,
{
    let handle = context.start_live_sync(
        |event| {
            if let Some(line) = describe(event) {
                info!("{line}");
            }
        },
        |err| error!(error = %err, "replication error"),
    )?;

    tokio::select! {
        () = shutdown => info!("shutting down"),
        () = handle.stopped() => warn!("session ended"),
    }
    handle.cancel();
    handle.stopped().await;

    let status = handle.status();
    info!(
        online = status.online,
        up_to_date = status.up_to_date,
        documents = context.local().document_count(),
        "sync stopped"
    );
    Ok(())
}

/// One-line description of the events worth reporting.
pub fn describe(event: &SyncEvent) -> Option<String> {
    match event {
        SyncEvent::Change(change) => Some(format!(
            "{}: {} written from {} changes (seq {})",
            change.direction, change.docs_written, change.docs_read, change.last_seq
        )),
        SyncEvent::Complete => Some("replication complete".to_string()),
        SyncEvent::NetworkOnline => Some("network online".to_string()),
        SyncEvent::NetworkOffline => Some("network offline".to_string()),
        _ => None,
    }
}
