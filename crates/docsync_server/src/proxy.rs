//! Streams attachments from the remote without exposing its credentials.

use crate::error::{ServerError, ServerResult};
use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use docsync_protocol::{DocumentId, DEFAULT_CONTENT_TYPE};
use docsync_remote::{AttachmentStream, RemoteStore};
use serde_json::Value;
use tracing::debug;

/// Attachment names tried, in order, when the caller gives no usable hint.
pub const PREFERRED_ATTACHMENT_NAMES: [&str; 3] = ["photo", "image", "file"];

/// Cache policy sent with proxied attachments.
pub const ATTACHMENT_CACHE_CONTROL: &str = "public, max-age=300";

/// Picks the attachment to serve from a document's attachment names.
///
/// Preferred names win; otherwise the lexicographically first name.
#[must_use]
pub fn choose_attachment<'a, I>(names: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = names.into_iter().collect();
    PREFERRED_ATTACHMENT_NAMES
        .iter()
        .find_map(|preferred| names.iter().copied().find(|name| name == preferred))
        .or_else(|| names.iter().copied().min())
}

/// Opens a stream of one attachment of document `id`.
///
/// A non-empty `hint` is tried first; if it fails, the attachment is
/// discovered from the document itself.
///
/// # Errors
///
/// `NotFound` when the document does not exist or has no attachments,
/// `Upstream` for any other remote failure.
pub async fn fetch_attachment(
    remote: &dyn RemoteStore,
    id: &DocumentId,
    hint: Option<&str>,
) -> ServerResult<AttachmentStream> {
    if let Some(name) = hint.filter(|name| !name.is_empty()) {
        match remote.fetch_attachment(id, name).await {
            Ok(stream) => return Ok(stream),
            Err(err) => debug!(%id, name, error = %err, "hinted attachment unavailable"),
        }
    }

    let doc = remote
        .get_document(id)
        .await
        .map_err(|err| ServerError::from_remote(err, format!("document {id}")))?
        .ok_or_else(|| ServerError::NotFound(format!("document {id}")))?;

    let names = doc
        .get("_attachments")
        .and_then(Value::as_object)
        .map(|attachments| attachments.keys().map(String::as_str));
    let name = names
        .and_then(choose_attachment)
        .ok_or_else(|| ServerError::NotFound(format!("attachments of {id}")))?;

    remote
        .fetch_attachment(id, name)
        .await
        .map_err(ServerError::Upstream)
}

/// Turns an attachment stream into a cacheable response.
///
/// # Errors
///
/// Returns `Internal` if the response cannot be assembled.
pub fn into_response(stream: AttachmentStream) -> ServerResult<Response> {
    let content_type = HeaderValue::from_str(&stream.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CACHE_CONTROL, ATTACHMENT_CACHE_CONTROL);
    if let Some(length) = stream.content_length {
        builder = builder.header(CONTENT_LENGTH, length);
    }

    builder
        .body(Body::from_stream(stream.body))
        .map_err(|err| ServerError::Internal(format!("failed to build response: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_names_win() {
        assert_eq!(choose_attachment(["x", "photo"]), Some("photo"));
        assert_eq!(choose_attachment(["file", "image"]), Some("image"));
        assert_eq!(choose_attachment(["zeta", "file"]), Some("file"));
    }

    #[test]
    fn falls_back_to_first_name() {
        assert_eq!(choose_attachment(["y", "x"]), Some("x"));
        assert_eq!(choose_attachment(Vec::<&str>::new()), None);
    }

    #[test]
    fn response_headers() {
        let stream = AttachmentStream::from_bytes("image/png", bytes::Bytes::from_static(b"png"));
        let response = into_response(stream).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "image/png");
        assert_eq!(response.headers()[CACHE_CONTROL], ATTACHMENT_CACHE_CONTROL);
        assert_eq!(response.headers()[CONTENT_LENGTH], "3");
    }
}
