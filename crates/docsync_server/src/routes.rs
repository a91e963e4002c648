//! HTTP routes.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::files::{FileStore, PUBLIC_PREFIX};
use crate::migration::run_migration_batch;
use crate::proxy;
use crate::upload::{store_upload, UploadReceipt};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use docsync_protocol::DocumentId;
use docsync_remote::RemoteStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Remote database.
    pub remote: Arc<dyn RemoteStore>,
    /// File storage for uploads and migrated photos.
    pub files: FileStore,
}

impl AppState {
    /// Creates handler state.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, files: FileStore) -> Self {
        Self { remote, files }
    }
}

#[derive(Debug, Deserialize)]
struct AttachmentQuery {
    name: Option<String>,
}

/// Response body of `POST /export-attachments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResponse {
    /// Always true.
    pub ok: bool,
    /// Documents that now reference a stored file.
    pub processed: usize,
    /// Of those, how many still carry the inline photo.
    pub retained: usize,
}

/// Builds the application router.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let uploads = ServeDir::new(state.files.root());
    Router::new()
        .route("/attachment/{id}", get(get_attachment))
        .route("/export-attachments", post(export_attachments))
        .route("/upload", post(upload))
        .nest_service(PUBLIC_PREFIX, uploads)
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn get_attachment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AttachmentQuery>,
) -> ServerResult<Response> {
    let id = DocumentId::new(id);
    let stream = proxy::fetch_attachment(state.remote.as_ref(), &id, query.name.as_deref()).await?;
    proxy::into_response(stream)
}

async fn export_attachments(State(state): State<AppState>) -> ServerResult<Json<ExportResponse>> {
    let report = run_migration_batch(state.remote.as_ref(), &state.files)
        .await
        .map_err(|err| {
            error!(error = %err, "attachment export failed");
            ServerError::Internal("Exporter failed".to_string())
        })?;
    Ok(Json(ExportResponse {
        ok: true,
        processed: report.processed,
        retained: report.retained,
    }))
}

async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<Json<UploadReceipt>> {
    let mut multipart = multipart.map_err(|_| {
        ServerError::Validation("Invalid content type. Expected multipart/form-data.".to_string())
    })?;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let Some(original_name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let data = field.bytes().await.map_err(multipart_error)?;
        return store_upload(&state.files, Some(&original_name), &data)
            .await
            .map(Json)
            .map_err(|err| {
                error!(error = %err, "upload failed");
                ServerError::Internal("Upload failed".to_string())
            });
    }

    Err(ServerError::Validation(
        "No file provided under field name \"file\".".to_string(),
    ))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ServerError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge
    } else {
        ServerError::Validation(err.body_text())
    }
}
