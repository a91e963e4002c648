//! Error types for the server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use docsync_remote::RemoteError;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while serving a request.
///
/// Responses carry a short fixed message; details stay in the logs.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The requested document or attachment does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote database failed.
    #[error("upstream error: {0}")]
    Upstream(#[source] RemoteError),

    /// The request was malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The request body exceeded the configured limit.
    #[error("request body too large")]
    PayloadTooLarge,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Maps a remote failure, keeping 404s distinguishable.
    #[must_use]
    pub fn from_remote(err: RemoteError, what: impl Into<String>) -> Self {
        if err.is_not_found() {
            ServerError::NotFound(what.into())
        } else {
            ServerError::Upstream(err)
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServerError::Validation(_) => StatusCode::BAD_REQUEST,
            ServerError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ServerError::Internal(_) | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }

    /// Returns true if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }

    fn public_message(&self) -> String {
        match self {
            ServerError::NotFound(_) => "Not found".to_string(),
            ServerError::Upstream(_) => "Upstream error".to_string(),
            ServerError::Validation(message) => message.clone(),
            ServerError::PayloadTooLarge => "Request body too large".to_string(),
            ServerError::Internal(message) => message.clone(),
            ServerError::Io(_) => "Internal error".to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
