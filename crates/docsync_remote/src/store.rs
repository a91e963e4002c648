//! The remote store trait.

use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use docsync_core::DocumentStore;
use docsync_protocol::{DocumentId, RawDocument, Revision};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use std::fmt;

/// Attachment bytes streamed from a remote.
pub struct AttachmentStream {
    /// Content type reported by the remote.
    pub content_type: String,
    /// Length in bytes, if the remote reported it.
    pub content_length: Option<u64>,
    /// The bytes.
    pub body: BoxStream<'static, RemoteResult<Bytes>>,
}

impl fmt::Debug for AttachmentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentStream")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl AttachmentStream {
    /// Wraps bytes already in memory.
    #[must_use]
    pub fn from_bytes(content_type: impl Into<String>, data: Bytes) -> Self {
        Self {
            content_type: content_type.into(),
            content_length: Some(data.len() as u64),
            body: futures::stream::once(async move { Ok(data) }).boxed(),
        }
    }

    /// Collects the whole body.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by the stream.
    pub async fn into_bytes(self) -> RemoteResult<Bytes> {
        let capacity = self.content_length.unwrap_or(0).min(16 * 1024 * 1024) as usize;
        let buffer = self
            .body
            .try_fold(BytesMut::with_capacity(capacity), |mut buffer, chunk| async move {
                buffer.extend_from_slice(&chunk);
                Ok::<_, RemoteError>(buffer)
            })
            .await?;
        Ok(buffer.freeze())
    }
}

/// A remote CouchDB-style database.
///
/// Besides the replication primitives of [`DocumentStore`], a remote exposes
/// plain document and attachment CRUD for server-side jobs. CRUD bodies are
/// untyped JSON so documents written by other clients pass through intact.
#[async_trait]
pub trait RemoteStore: DocumentStore<Error = RemoteError> {
    /// Stable name of this remote, without credentials. Used in checkpoint
    /// keys.
    fn identifier(&self) -> String;

    /// Checks that the remote answers at all.
    async fn ping(&self) -> RemoteResult<()>;

    /// Creates the database if it does not exist.
    async fn ensure_database(&self) -> RemoteResult<()>;

    /// Lists every live document with attachment stubs, exactly as stored.
    async fn all_documents(&self) -> RemoteResult<Vec<RawDocument>>;

    /// Fetches the current revision of a document with attachment stubs.
    async fn get_document(&self, id: &DocumentId) -> RemoteResult<Option<RawDocument>>;

    /// Writes a body as is; its `_rev` must be the current revision.
    async fn put_document(&self, id: &DocumentId, body: &RawDocument) -> RemoteResult<Revision>;

    /// Streams one attachment.
    async fn fetch_attachment(&self, id: &DocumentId, name: &str) -> RemoteResult<AttachmentStream>;

    /// Removes one attachment at `rev`, returning the new revision.
    async fn delete_attachment(
        &self,
        id: &DocumentId,
        name: &str,
        rev: &Revision,
    ) -> RemoteResult<Revision>;
}
