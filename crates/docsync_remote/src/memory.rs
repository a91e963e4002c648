//! In-memory remote for tests and local development.

use crate::error::{RemoteError, RemoteResult};
use crate::store::{AttachmentStream, RemoteStore};
use async_trait::async_trait;
use docsync_core::{CoreError, DocumentStore, LocalStore};
use docsync_protocol::{
    ApplyOutcome, ChangesPage, Document, DocumentId, Feed, RawDocument, Revision,
    RevisionedDocument, RevsDiff, RevsDiffRequest, Sequence,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// A remote backed by an in-memory [`LocalStore`], with failure injection.
///
/// Every call first checks the injected state: offline calls fail with
/// [`RemoteError::Network`], denied calls with [`RemoteError::Unauthorized`].
#[derive(Debug)]
pub struct MemoryRemote {
    name: String,
    store: LocalStore,
    offline: AtomicBool,
    denied: AtomicBool,
    fail_listing: AtomicBool,
    fail_attachment_delete: AtomicBool,
    failing_fetches: Mutex<HashSet<DocumentId>>,
    garbled: Mutex<HashSet<DocumentId>>,
    calls: AtomicUsize,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new("memory://remote")
    }
}

impl MemoryRemote {
    /// Creates an empty remote named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: LocalStore::in_memory(),
            offline: AtomicBool::new(false),
            denied: AtomicBool::new(false),
            fail_listing: AtomicBool::new(false),
            fail_attachment_delete: AtomicBool::new(false),
            failing_fetches: Mutex::new(HashSet::new()),
            garbled: Mutex::new(HashSet::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Direct access to the backing store, bypassing failure injection.
    #[must_use]
    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Makes every call fail as unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes every call fail as unauthorized.
    pub fn set_denied(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    /// Makes `all_documents` fail.
    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    /// Makes `delete_attachment` fail.
    pub fn fail_attachment_delete(&self, fail: bool) {
        self.fail_attachment_delete.store(fail, Ordering::SeqCst);
    }

    /// Makes `fetch_attachment` fail for one document.
    pub fn fail_fetch_for(&self, id: &DocumentId) {
        self.failing_fetches.lock().insert(id.clone());
    }

    /// Makes `get_revisions` answer with an undecodable body for one document.
    pub fn garble(&self, id: &DocumentId) {
        self.garbled.lock().insert(id.clone());
    }

    /// Number of calls made against this remote.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> RemoteResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("remote unreachable".to_string()));
        }
        if self.denied.load(Ordering::SeqCst) {
            return Err(RemoteError::Unauthorized { status: 401 });
        }
        Ok(())
    }

    fn write(&self, doc: Document) -> RemoteResult<Revision> {
        let written = self.store.put(doc).map_err(map_core)?;
        written
            .revision
            .ok_or_else(|| RemoteError::Decode("write returned no revision".to_string()))
    }
}

fn to_body(doc: Document) -> RemoteResult<RawDocument> {
    match serde_json::to_value(doc)? {
        Value::Object(body) => Ok(body),
        _ => Err(RemoteError::Decode("document is not an object".to_string())),
    }
}

fn map_core(err: CoreError) -> RemoteError {
    match err {
        CoreError::NotFound { id } => RemoteError::NotFound(id.to_string()),
        CoreError::Conflict { id, .. } => RemoteError::Conflict(id.to_string()),
        other => RemoteError::Upstream {
            status: 500,
            body: other.to_string(),
        },
    }
}

#[async_trait]
impl DocumentStore for MemoryRemote {
    type Error = RemoteError;

    async fn changes(
        &self,
        since: &Sequence,
        limit: usize,
        feed: Feed,
    ) -> RemoteResult<ChangesPage> {
        self.check()?;
        self.store.changes(since, limit, feed).await.map_err(map_core)
    }

    async fn revs_diff(&self, request: &RevsDiffRequest) -> RemoteResult<RevsDiff> {
        self.check()?;
        self.store.revs_diff(request).await.map_err(map_core)
    }

    async fn get_revisions(
        &self,
        id: &DocumentId,
        revs: &[Revision],
    ) -> RemoteResult<Vec<RevisionedDocument>> {
        self.check()?;
        if self.garbled.lock().contains(id) {
            return Err(RemoteError::Decode(format!("unreadable document {id}")));
        }
        self.store.get_revisions(id, revs).await.map_err(map_core)
    }

    async fn bulk_replicate(
        &self,
        docs: Vec<RevisionedDocument>,
    ) -> RemoteResult<Vec<ApplyOutcome>> {
        self.check()?;
        // A CouchDB server keeps conflicts silently; report plain success.
        let outcomes = self.store.bulk_replicate(docs).await.map_err(map_core)?;
        Ok(outcomes
            .into_iter()
            .map(|outcome| match outcome {
                ApplyOutcome::Conflict(conflict) => ApplyOutcome::Applied(conflict.id),
                other => other,
            })
            .collect())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn identifier(&self) -> String {
        self.name.clone()
    }

    async fn ping(&self) -> RemoteResult<()> {
        self.check()
    }

    async fn ensure_database(&self) -> RemoteResult<()> {
        self.check()
    }

    async fn all_documents(&self) -> RemoteResult<Vec<RawDocument>> {
        self.check()?;
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(RemoteError::Upstream {
                status: 500,
                body: "listing failed".to_string(),
            });
        }
        self.store.all_docs().into_iter().map(to_body).collect()
    }

    async fn get_document(&self, id: &DocumentId) -> RemoteResult<Option<RawDocument>> {
        self.check()?;
        let Some(mut doc) = self.store.get(id) else {
            return Ok(None);
        };
        for attachment in doc.attachments.values_mut() {
            *attachment = attachment.to_stub();
        }
        to_body(doc).map(Some)
    }

    async fn put_document(&self, id: &DocumentId, body: &RawDocument) -> RemoteResult<Revision> {
        self.check()?;
        // Only the keys a local store models are kept.
        let mut doc = Document::from_json(Value::Object(body.clone())).map_err(|err| {
            RemoteError::Upstream {
                status: 400,
                body: err.to_string(),
            }
        })?;
        doc.id = id.clone();
        self.write(doc)
    }

    async fn fetch_attachment(&self, id: &DocumentId, name: &str) -> RemoteResult<AttachmentStream> {
        self.check()?;
        if self.failing_fetches.lock().contains(id) {
            return Err(RemoteError::Upstream {
                status: 500,
                body: "attachment fetch failed".to_string(),
            });
        }
        let attachment = self
            .store
            .get_attachment(id, name)
            .ok_or_else(|| RemoteError::NotFound(format!("{id}/{name}")))?;
        let data = attachment.data.unwrap_or_default();
        Ok(AttachmentStream::from_bytes(attachment.content_type, data))
    }

    async fn delete_attachment(
        &self,
        id: &DocumentId,
        name: &str,
        rev: &Revision,
    ) -> RemoteResult<Revision> {
        self.check()?;
        if self.fail_attachment_delete.load(Ordering::SeqCst) {
            return Err(RemoteError::Upstream {
                status: 500,
                body: "attachment delete failed".to_string(),
            });
        }

        let mut doc = self
            .store
            .get(id)
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))?;
        if doc.revision.as_ref() != Some(rev) {
            return Err(RemoteError::Conflict(id.to_string()));
        }
        if doc.attachments.remove(name).is_none() {
            return Err(RemoteError::NotFound(format!("{id}/{name}")));
        }
        self.write(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync_protocol::{Attachment, Status};
    use serde_json::Map;

    fn with_photo(id: &str) -> Document {
        let mut doc = Document::new(DocumentId::new(id), "submission", Map::new());
        doc.attachments
            .insert("photo".into(), Attachment::inline("image/png", &b"png!"[..]));
        doc
    }

    #[tokio::test]
    async fn injected_failures() {
        let remote = MemoryRemote::default();
        remote.set_offline(true);
        assert!(remote.ping().await.unwrap_err().is_retryable());

        remote.set_offline(false);
        remote.set_denied(true);
        assert!(remote.ensure_database().await.unwrap_err().is_auth());

        remote.set_denied(false);
        remote.fail_listing(true);
        assert!(remote.all_documents().await.is_err());
        assert_eq!(remote.calls(), 3);
    }

    #[tokio::test]
    async fn garbled_document_fails_to_decode() {
        let remote = MemoryRemote::default();
        let saved = remote.store().put(with_photo("a")).unwrap();
        remote.garble(&saved.id);
        let revs = vec![saved.revision.clone().unwrap()];
        assert!(matches!(
            remote.get_revisions(&saved.id, &revs).await,
            Err(RemoteError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn listed_body_can_be_written_back_once() {
        let remote = MemoryRemote::default();
        let saved = remote.store().put(with_photo("a")).unwrap();
        let mut body = remote.all_documents().await.unwrap().remove(0);
        body.insert("status".into(), "approved".into());

        let rev = remote.put_document(&saved.id, &body).await.unwrap();
        assert_eq!(rev.generation(), 2);
        assert_eq!(remote.store().get(&saved.id).unwrap().status, Status::Approved);
        assert_eq!(
            &remote.store().get_attachment(&saved.id, "photo").unwrap().data.unwrap()[..],
            b"png!"
        );
        assert!(matches!(
            remote.put_document(&saved.id, &body).await,
            Err(RemoteError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn attachment_round_trip() {
        let remote = MemoryRemote::default();
        let saved = remote.store().put(with_photo("a")).unwrap();

        let fetched = remote.fetch_attachment(&saved.id, "photo").await.unwrap();
        assert_eq!(fetched.content_type, "image/png");
        assert_eq!(&fetched.into_bytes().await.unwrap()[..], b"png!");

        let listed = remote.get_document(&saved.id).await.unwrap().unwrap();
        assert_eq!(listed["_attachments"]["photo"]["stub"], true);

        let rev = saved.revision.clone().unwrap();
        let next = remote.delete_attachment(&saved.id, "photo", &rev).await.unwrap();
        assert_eq!(next.generation(), 2);
        assert!(remote
            .fetch_attachment(&saved.id, "photo")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn missing_document_is_none() {
        let remote = MemoryRemote::default();
        assert!(remote
            .get_document(&DocumentId::new("nope"))
            .await
            .unwrap()
            .is_none());
    }
}
