//! Change feed and revision diff wire types.

use crate::document::DocumentId;
use crate::revision::Revision;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// An opaque change-feed checkpoint.
///
/// Local stores use decimal update sequences; remote servers may use numbers
/// or opaque strings. Both are accepted on the wire and kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sequence(String);

impl Sequence {
    /// The sequence before any change.
    #[must_use]
    pub fn start() -> Self {
        Self("0".to_string())
    }

    /// Creates a sequence from text.
    #[must_use]
    pub fn new(seq: impl Into<String>) -> Self {
        Self(seq.into())
    }

    /// Creates a sequence from a numeric update counter.
    #[must_use]
    pub fn from_u64(seq: u64) -> Self {
        Self(seq.to_string())
    }

    /// Returns the numeric value, if this is a plain counter.
    #[must_use]
    pub fn as_u64(&self) -> Option<u64> {
        self.0.parse().ok()
    }

    /// Returns the sequence text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::start()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Sequence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Sequence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self::from_u64(n),
            Raw::Text(s) => Self(s),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct ChangeRev {
    rev: Revision,
}

/// One entry of a change feed.
///
/// Each document appears once, at its latest sequence, listing every leaf
/// revision it currently has.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Sequence of the document's latest write.
    pub seq: Sequence,
    /// Document id.
    pub id: DocumentId,
    /// All leaf revisions (`changes` on the wire).
    #[serde(rename = "changes", with = "change_revs")]
    pub revs: Vec<Revision>,
    /// Whether the winning revision is a tombstone.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

mod change_revs {
    use super::ChangeRev;
    use crate::revision::Revision;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(revs: &[Revision], serializer: S) -> Result<S::Ok, S::Error> {
        revs.iter()
            .map(|rev| ChangeRev { rev: rev.clone() })
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Revision>, D::Error> {
        Ok(Vec::<ChangeRev>::deserialize(deserializer)?
            .into_iter()
            .map(|c| c.rev)
            .collect())
    }
}

/// A page of the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesPage {
    /// Changes after the requested sequence, oldest first.
    pub results: Vec<Change>,
    /// Checkpoint to resume from.
    pub last_seq: Sequence,
    /// Number of changes not yet returned, when the source reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<u64>,
}

impl ChangesPage {
    /// Creates an empty page that resumes at `last_seq`.
    #[must_use]
    pub fn empty(last_seq: Sequence) -> Self {
        Self {
            results: Vec::new(),
            last_seq,
            pending: Some(0),
        }
    }

    /// Returns true if the source has nothing left after this page.
    ///
    /// Without a `pending` count, a short page means the feed is drained.
    #[must_use]
    pub fn is_drained(&self, limit: usize) -> bool {
        match self.pending {
            Some(pending) => pending == 0,
            None => self.results.len() < limit,
        }
    }
}

/// How a change feed request waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Feed {
    /// Return immediately.
    #[default]
    Normal,
    /// Wait up to the timeout for at least one change.
    LongPoll(Duration),
}

/// Revisions offered to a target, keyed by document id.
pub type RevsDiffRequest = BTreeMap<DocumentId, Vec<Revision>>;

/// Revisions the target is missing, keyed by document id.
pub type RevsDiff = BTreeMap<DocumentId, Vec<Revision>>;
