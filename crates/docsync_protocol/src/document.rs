//! Documents and their CouchDB JSON representation.

use crate::attachment::Attachment;
use crate::revision::{Revision, Revisions};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Document kind of application submissions.
pub const SUBMISSION_KIND: &str = "submission";

/// Attachment name used for a submission's photo.
pub const PHOTO_ATTACHMENT: &str = "photo";

/// Field that references a migrated photo in file storage.
pub const IMAGE_NAME_FIELD: &str = "imageName";

/// Key prefix reserved by the store.
pub const RESERVED_PREFIX: &str = "_";

/// Content type used when none is known.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Returns true if `key` is reserved by the store.
#[must_use]
pub fn is_reserved_key(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}

/// A document body exactly as a remote stored it, unknown keys included.
pub type RawDocument = Map<String, Value>;

/// Returns true if an `imageName` value counts as set.
///
/// Empty strings, `false`, `0` and `null` count as unset.
#[must_use]
pub fn is_image_name_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

/// Removes every reserved key from `fields`.
pub fn strip_reserved(fields: &mut Map<String, Value>) {
    fields.retain(|key, _| !is_reserved_key(key));
}

/// A stable, unique document identifier (`_id`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates an id from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh submission id: `submission:{unix millis}:{uuid}`.
    #[must_use]
    pub fn submission() -> Self {
        Self(format!(
            "{SUBMISSION_KIND}:{}:{}",
            Utc::now().timestamp_millis(),
            uuid::Uuid::new_v4()
        ))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for DocumentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Workflow state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Awaiting review.
    #[default]
    Pending,
    /// Accepted.
    Approved,
    /// Declined.
    Rejected,
    /// A status written by a newer client.
    #[serde(other)]
    Unknown,
}

/// A replicated document.
///
/// Only the keys below are kept; anything else on the wire is dropped when
/// the document is deserialized, and reserved keys never survive in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique id.
    #[serde(rename = "_id")]
    pub id: DocumentId,
    /// Current revision, `None` before the first write.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    /// Tombstone marker.
    #[serde(rename = "_deleted", default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
    /// Discriminator such as `"submission"`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Workflow status.
    #[serde(default)]
    pub status: Status,
    /// Application data.
    #[serde(default, deserialize_with = "deserialize_fields")]
    pub fields: Map<String, Value>,
    /// Creation time.
    #[serde(rename = "createdAt", default, with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    #[serde(rename = "updatedAt", default, with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Inline attachments keyed by name.
    #[serde(rename = "_attachments", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attachments: BTreeMap<String, Attachment>,
}

fn deserialize_fields<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Map<String, Value>, D::Error> {
    let mut fields = Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    strip_reserved(&mut fields);
    Ok(fields)
}

impl Document {
    /// Creates an unsaved document with both timestamps set to now.
    #[must_use]
    pub fn new(id: DocumentId, kind: impl Into<String>, mut fields: Map<String, Value>) -> Self {
        strip_reserved(&mut fields);
        let now = Utc::now();
        Self {
            id,
            revision: None,
            deleted: false,
            kind: kind.into(),
            status: Status::Pending,
            fields,
            created_at: now,
            updated_at: now,
            attachments: BTreeMap::new(),
        }
    }

    /// Creates a pending submission with a fresh id.
    #[must_use]
    pub fn submission(fields: Map<String, Value>) -> Self {
        Self::new(DocumentId::submission(), SUBMISSION_KIND, fields)
    }

    /// Parses a document from untyped JSON, keeping only known keys.
    ///
    /// # Errors
    ///
    /// Returns an error if required keys are missing or malformed.
    pub fn from_json(value: Value) -> Result<Self, crate::ProtocolError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Refreshes `updated_at`, never moving it backwards.
    pub fn touch(&mut self) {
        self.updated_at = self.updated_at.max(Utc::now());
    }

    /// Returns the file-storage reference, if one is set.
    #[must_use]
    pub fn image_name(&self) -> Option<&Value> {
        self.fields
            .get(IMAGE_NAME_FIELD)
            .filter(|value| is_image_name_set(value))
    }

    /// The JSON body a revision hash covers: everything except `_rev`.
    #[must_use]
    pub fn content_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.remove("_rev");
        }
        value
    }

    /// Builds the tombstone that deletes this document.
    #[must_use]
    pub fn tombstone(&self) -> Self {
        let mut tombstone = Self {
            id: self.id.clone(),
            revision: self.revision.clone(),
            deleted: true,
            kind: self.kind.clone(),
            status: self.status,
            fields: Map::new(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            attachments: BTreeMap::new(),
        };
        tombstone.touch();
        tombstone
    }
}

/// A document together with its revision ancestry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionedDocument {
    /// The document body.
    #[serde(flatten)]
    pub document: Document,
    /// Ancestry, newest first.
    #[serde(rename = "_revisions", default, skip_serializing_if = "Option::is_none")]
    pub revisions: Option<Revisions>,
}

impl RevisionedDocument {
    /// Returns the revision history, newest first.
    ///
    /// Falls back to the bare `_rev` when no ancestry was sent.
    #[must_use]
    pub fn history(&self) -> Vec<Revision> {
        match &self.revisions {
            Some(revisions) => revisions.to_history(),
            None => self.document.revision.iter().cloned().collect(),
        }
    }
}

mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        // Documents written by other clients may carry odd or missing timestamps.
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default())
    }
}
