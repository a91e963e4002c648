//! # docsync server
//!
//! HTTP surface in front of the remote document database:
//! - `GET /attachment/{id}?name=` streams an attachment without exposing
//!   the database credentials
//! - `POST /export-attachments` moves inline submission photos into file
//!   storage
//! - `POST /upload` stores a multipart file upload
//! - `GET /uploads/{file}` serves stored files
//!
//! ```rust,ignore
//! use docsync_server::{serve, ServerConfig};
//!
//! let config = ServerConfig::default().with_upload_dir("static/uploads");
//! serve(config, async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod files;
mod migration;
mod proxy;
mod routes;
mod upload;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use files::{generate_name, public_url, FileStore, PUBLIC_PREFIX};
pub use migration::{
    extension_for, run_migration_batch, CandidateOutcome, MigrationReport, MigrationStage,
    FALLBACK_EXTENSION,
};
pub use proxy::{
    choose_attachment, fetch_attachment, ATTACHMENT_CACHE_CONTROL, PREFERRED_ATTACHMENT_NAMES,
};
pub use routes::{build_router, AppState, ExportResponse};
pub use upload::{safe_extension, store_upload, UploadReceipt, ALLOWED_EXTENSIONS};

use docsync_remote::HttpRemote;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Runs the server until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the remote configuration is invalid or the
/// listener cannot be bound.
pub async fn serve<F>(config: ServerConfig, shutdown: F) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let remote = HttpRemote::new(config.remote.clone())
        .map_err(|err| ServerError::Internal(format!("invalid remote configuration: {err}")))?;
    let state = AppState::new(Arc::new(remote), FileStore::new(&config.upload_dir));
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(
        addr = %listener.local_addr()?,
        database = %config.remote.database,
        uploads = %config.upload_dir.display(),
        "docsync server listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("docsync server stopped");
    Ok(())
}
