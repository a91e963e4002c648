//! Inline document attachments.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A named binary blob stored with a document (`_attachments` entry).
///
/// Attachments fetched with `attachments=true` carry their bytes in `data`;
/// otherwise they are stubs that only describe the blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type of the blob.
    #[serde(default = "default_content_type")]
    pub content_type: String,
    /// Inline bytes, base64 on the wire.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes"
    )]
    pub data: Option<Bytes>,
    /// Upstream digest, e.g. `md5-...`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    /// Blob length in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    /// Revision generation at which the blob was added.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revpos: Option<u64>,
    /// True when only metadata is present.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stub: bool,
}

fn default_content_type() -> String {
    crate::DEFAULT_CONTENT_TYPE.to_string()
}

impl Attachment {
    /// Creates an attachment holding `data` inline.
    #[must_use]
    pub fn inline(content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            content_type: content_type.into(),
            length: Some(data.len() as u64),
            data: Some(data),
            digest: None,
            revpos: None,
            stub: false,
        }
    }

    /// Returns true if the attachment has no inline bytes.
    #[must_use]
    pub fn is_stub(&self) -> bool {
        self.stub || self.data.is_none()
    }

    /// Returns a metadata-only copy.
    #[must_use]
    pub fn to_stub(&self) -> Self {
        Self {
            length: self.length.or(self.data.as_ref().map(|d| d.len() as u64)),
            data: None,
            stub: true,
            ..self.clone()
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Option<Bytes>, serializer: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Bytes>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| {
                STANDARD
                    .decode(s.as_bytes())
                    .map(Bytes::from)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}
