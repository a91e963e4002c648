//! Test fixtures.
//!
//! Stores here panic on failure; they are meant for tests only.

use bytes::Bytes;
use docsync_core::{LocalStore, StoreConfig, Submissions};
use docsync_protocol::{Attachment, Document, DocumentId, PHOTO_ATTACHMENT};
use docsync_remote::MemoryRemote;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tempfile::TempDir;

/// Smallest byte sequence that sniffs as a JPEG.
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00, 0xFF, 0xD9];

/// PNG signature followed by an empty IHDR-sized tail.
pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

/// A local store paired with an in-memory remote.
pub struct TestStores {
    /// The local store.
    pub local: Arc<LocalStore>,
    /// The remote.
    pub remote: Arc<MemoryRemote>,
    _temp_dir: Option<TempDir>,
}

impl TestStores {
    /// Creates an in-memory local store and an empty remote.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            local: Arc::new(LocalStore::in_memory()),
            remote: Arc::new(MemoryRemote::default()),
            _temp_dir: None,
        }
    }

    /// Creates a file-backed local store in a temporary directory.
    #[must_use]
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let local = LocalStore::open(temp_dir.path(), StoreConfig::default())
            .expect("Failed to open local store");
        Self {
            local: Arc::new(local),
            remote: Arc::new(MemoryRemote::default()),
            _temp_dir: Some(temp_dir),
        }
    }

    /// The submissions API over the local store.
    #[must_use]
    pub fn submissions(&self) -> Submissions {
        Submissions::new(Arc::clone(&self.local))
    }

    /// Writes a submission straight into the remote.
    pub fn seed_remote(&self, fields: Map<String, Value>) -> Document {
        self.remote
            .store()
            .put(Document::submission(fields))
            .expect("Failed to seed remote")
    }

    /// Writes a submission with an inline photo straight into the remote.
    pub fn seed_remote_photo(
        &self,
        fields: Map<String, Value>,
        data: &[u8],
        content_type: &str,
    ) -> Document {
        self.remote
            .store()
            .put(photo_submission(fields, data, content_type))
            .expect("Failed to seed remote")
    }

    /// Writes a document of another kind straight into the remote.
    pub fn seed_remote_kind(&self, id: &str, kind: &str) -> Document {
        self.remote
            .store()
            .put(Document::new(DocumentId::new(id), kind, sample_fields("other")))
            .expect("Failed to seed remote")
    }
}

/// Field map with a name and an age.
#[must_use]
pub fn sample_fields(name: &str) -> Map<String, Value> {
    object(json!({ "name": name, "age": 30 }))
}

/// Converts a JSON object literal into a map.
#[must_use]
pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Builds an unsaved submission carrying an inline photo.
#[must_use]
pub fn photo_submission(fields: Map<String, Value>, data: &[u8], content_type: &str) -> Document {
    let mut doc = Document::submission(fields);
    doc.attachments.insert(
        PHOTO_ATTACHMENT.to_string(),
        Attachment::inline(content_type, Bytes::copy_from_slice(data)),
    );
    doc
}
