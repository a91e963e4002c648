//! Remote store errors.

use thiserror::Error;

/// Result type for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by a remote store.
///
/// Messages never include credentials or request URLs.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote could not be reached (connect failure, timeout, offline).
    #[error("network unavailable: {0}")]
    Network(String),

    /// The remote rejected the credentials (401/403).
    #[error("authorization denied (HTTP {status})")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
    },

    /// The document or attachment does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The write was based on a stale revision.
    #[error("document update conflict: {0}")]
    Conflict(String),

    /// The remote answered with an unexpected status.
    #[error("upstream returned HTTP {status}: {body}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),

    /// The request could not be built or sent.
    #[error("HTTP error: {0}")]
    Http(String),
}

const MAX_BODY_CHARS: usize = 512;

impl RemoteError {
    /// Maps a non-success HTTP status and body to an error.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let reason = couch_reason(body);
        match status {
            401 | 403 => Self::Unauthorized { status },
            404 => Self::NotFound(reason),
            409 => Self::Conflict(reason),
            _ => Self::Upstream {
                status,
                body: body.chars().take(MAX_BODY_CHARS).collect(),
            },
        }
    }

    /// Returns true if retrying later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Upstream { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }

    /// Returns true if the remote rejected our credentials.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Returns true for a missing document or attachment.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Extracts CouchDB's `reason` (or `error`) from an error body.
fn couch_reason(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct CouchError {
        error: Option<String>,
        reason: Option<String>,
    }

    serde_json::from_str::<CouchError>(body)
        .ok()
        .and_then(|e| e.reason.or(e.error))
        .unwrap_or_else(|| body.chars().take(MAX_BODY_CHARS).collect())
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            Self::Network(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), "")
        } else {
            Self::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(RemoteError::from_status(401, "").is_auth());
        assert!(RemoteError::from_status(403, "").is_auth());
        assert!(RemoteError::from_status(404, r#"{"error":"not_found","reason":"missing"}"#)
            .is_not_found());
        assert!(matches!(
            RemoteError::from_status(409, ""),
            RemoteError::Conflict(_)
        ));
    }

    #[test]
    fn retryable_statuses() {
        for status in [408, 429, 500, 502, 503] {
            assert!(RemoteError::from_status(status, "").is_retryable(), "{status}");
        }
        for status in [400, 401, 404, 409, 412] {
            assert!(!RemoteError::from_status(status, "").is_retryable(), "{status}");
        }
        assert!(RemoteError::Network("down".into()).is_retryable());
    }

    #[test]
    fn reason_is_extracted() {
        let err = RemoteError::from_status(404, r#"{"error":"not_found","reason":"deleted"}"#);
        assert_eq!(err.to_string(), "not found: deleted");
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(5000);
        let RemoteError::Upstream { body, .. } = RemoteError::from_status(500, &body) else {
            panic!("expected upstream error");
        };
        assert_eq!(body.len(), 512);
    }
}
