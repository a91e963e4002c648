//! Application-level submission operations.

use crate::error::{CoreError, CoreResult};
use crate::local::LocalStore;
use bytes::Bytes;
use docsync_protocol::{
    strip_reserved, Attachment, Document, DocumentId, DEFAULT_CONTENT_TYPE, PHOTO_ATTACHMENT,
    SUBMISSION_KIND,
};
use serde_json::{Map, Value};
use std::sync::Arc;

/// A binary payload to attach to a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// MIME type, if known.
    pub content_type: Option<String>,
    /// The bytes.
    pub data: Bytes,
}

impl Blob {
    /// Creates a blob without a content type.
    #[must_use]
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            content_type: None,
            data: data.into(),
        }
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// Submission operations over a local store.
///
/// # Example
///
/// ```rust
/// use docsync_core::{LocalStore, Submissions};
/// use docsync_protocol::Status;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let submissions = Submissions::new(Arc::new(LocalStore::in_memory()));
/// let fields = json!({"name": "Ann"}).as_object().cloned().unwrap();
/// let mut saved = submissions.save_submission(fields).unwrap();
///
/// saved.status = Status::Approved;
/// submissions.update_submission(saved).unwrap();
/// assert_eq!(submissions.list_submissions()[0].status, Status::Approved);
/// ```
#[derive(Debug, Clone)]
pub struct Submissions {
    store: Arc<LocalStore>,
}

impl Submissions {
    /// Creates the API over `store`.
    #[must_use]
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Saves a new pending submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn save_submission(&self, fields: Map<String, Value>) -> CoreResult<Document> {
        let saved = self.store.put(Document::submission(fields))?;
        tracing::info!(id = %saved.id, "submission saved");
        Ok(saved)
    }

    /// Saves a new pending submission with `blob` as its photo.
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails.
    pub fn save_submission_with_attachment(
        &self,
        fields: Map<String, Value>,
        blob: Blob,
    ) -> CoreResult<Document> {
        let mut doc = Document::submission(fields);
        let content_type = blob
            .content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        doc.attachments.insert(
            PHOTO_ATTACHMENT.to_string(),
            Attachment::inline(content_type, blob.data),
        );

        let saved = self.store.put(doc)?;
        tracing::info!(id = %saved.id, "submission with photo saved");
        Ok(saved)
    }

    /// Lists live submissions, newest `createdAt` first.
    ///
    /// Attachments are returned as stubs; use
    /// [`try_get_local_attachment`](Self::try_get_local_attachment) for bytes.
    #[must_use]
    pub fn list_submissions(&self) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .store
            .all_docs()
            .into_iter()
            .filter(|doc| doc.kind == SUBMISSION_KIND && !doc.deleted)
            .collect();
        docs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        docs
    }

    /// Persists an edited submission and refreshes its `updatedAt`.
    ///
    /// Only the document's known keys are written; reserved keys in `fields`
    /// are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] if the submission changed since it was
    /// read.
    pub fn update_submission(&self, mut doc: Document) -> CoreResult<Document> {
        strip_reserved(&mut doc.fields);
        doc.touch();
        let saved = self.store.put(doc)?;
        tracing::debug!(id = %saved.id, rev = ?saved.revision, "submission updated");
        Ok(saved)
    }

    /// Like [`update_submission`](Self::update_submission), from untyped JSON.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidDocument`] if the JSON is not a document,
    /// or any error of `update_submission`.
    pub fn update_submission_json(&self, value: Value) -> CoreResult<Document> {
        let doc = Document::from_json(value)
            .map_err(|err| CoreError::InvalidDocument(err.to_string()))?;
        self.update_submission(doc)
    }

    /// Deletes a submission.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] if `doc` is not the current revision.
    pub fn delete_submission(&self, doc: &Document) -> CoreResult<()> {
        let revision = self.store.remove(&doc.id, doc.revision.as_ref())?;
        tracing::info!(id = %doc.id, rev = %revision, "submission deleted");
        Ok(())
    }

    /// Reads attachment bytes from the local store; `None` on any miss.
    #[must_use]
    pub fn try_get_local_attachment(&self, id: &DocumentId, name: Option<&str>) -> Option<Bytes> {
        self.store
            .get_attachment(id, name.unwrap_or(PHOTO_ATTACHMENT))
            .and_then(|attachment| attachment.data)
    }
}
