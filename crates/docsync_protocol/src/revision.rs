//! Revision tokens.

use crate::error::ProtocolError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A document revision, `"{generation}-{hash}"` on the wire.
///
/// Revisions order by generation first and hash second, which is the order
/// used to pick a deterministic winner among conflicting leaves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision {
    generation: u64,
    hash: String,
}

impl Revision {
    /// Creates a revision from its parts.
    #[must_use]
    pub fn new(generation: u64, hash: impl Into<String>) -> Self {
        Self {
            generation,
            hash: hash.into(),
        }
    }

    /// Derives the revision of a new write.
    ///
    /// The generation is one past the parent's (1 for a first write). The hash
    /// is the first 16 bytes of SHA-256 over the parent revision, the deletion
    /// flag and the canonical JSON body, so identical edits made on two stores
    /// produce identical revisions.
    #[must_use]
    pub fn derive(parent: Option<&Revision>, deleted: bool, body: &serde_json::Value) -> Self {
        let mut hasher = Sha256::new();
        if let Some(parent) = parent {
            hasher.update(parent.to_string().as_bytes());
        }
        hasher.update([u8::from(deleted)]);
        // serde_json maps are sorted, so this rendering is canonical.
        hasher.update(body.to_string().as_bytes());
        let digest = hasher.finalize();

        Self {
            generation: parent.map_or(1, |p| p.generation + 1),
            hash: hex::encode(&digest[..16]),
        }
    }

    /// Returns the generation number.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns the hash part.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.generation, self.hash)
    }
}

impl FromStr for Revision {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (generation, hash) = s
            .split_once('-')
            .ok_or_else(|| ProtocolError::InvalidRevision(s.to_string()))?;
        let generation: u64 = generation
            .parse()
            .map_err(|_| ProtocolError::InvalidRevision(s.to_string()))?;
        if generation == 0 || hash.is_empty() {
            return Err(ProtocolError::InvalidRevision(s.to_string()));
        }
        Ok(Self::new(generation, hash))
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.generation
            .cmp(&other.generation)
            .then_with(|| self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Revision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Revision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Revision ancestry as carried in `_revisions`.
///
/// `ids` holds hashes newest first; the revision at index `i` has generation
/// `start - i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revisions {
    /// Generation of the newest revision.
    pub start: u64,
    /// Hashes, newest first.
    pub ids: Vec<String>,
}

impl Revisions {
    /// Builds ancestry from a newest-first revision history.
    ///
    /// Returns `None` for an empty history.
    #[must_use]
    pub fn from_history(history: &[Revision]) -> Option<Self> {
        let newest = history.first()?;
        Some(Self {
            start: newest.generation,
            ids: history.iter().map(|r| r.hash.clone()).collect(),
        })
    }

    /// Expands the ancestry into full revisions, newest first.
    #[must_use]
    pub fn to_history(&self) -> Vec<Revision> {
        self.ids
            .iter()
            .enumerate()
            .take_while(|(i, _)| (*i as u64) < self.start)
            .map(|(i, hash)| Revision::new(self.start - i as u64, hash.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn parse_and_display() {
        let rev: Revision = "3-abc123".parse().unwrap();
        assert_eq!(rev.generation(), 3);
        assert_eq!(rev.hash(), "abc123");
        assert_eq!(rev.to_string(), "3-abc123");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "abc", "0-abc", "x-abc", "3-", "-abc"] {
            assert!(bad.parse::<Revision>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn ordering_is_generation_then_hash() {
        let a = Revision::new(2, "ffff");
        let b = Revision::new(10, "0000");
        let c = Revision::new(10, "0001");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn derive_is_deterministic_and_advances() {
        let body = json!({"fields": {"name": "Ann"}});
        let first = Revision::derive(None, false, &body);
        assert_eq!(first.generation(), 1);
        assert_eq!(first.hash().len(), 32);
        assert_eq!(first, Revision::derive(None, false, &body));

        let second = Revision::derive(Some(&first), false, &body);
        assert_eq!(second.generation(), 2);
        assert_ne!(second.hash(), first.hash());

        let tombstone = Revision::derive(Some(&first), true, &body);
        assert_ne!(tombstone, second);
    }

    #[test]
    fn serde_as_string() {
        let rev = Revision::new(1, "aa");
        assert_eq!(serde_json::to_value(&rev).unwrap(), json!("1-aa"));
        let back: Revision = serde_json::from_value(json!("1-aa")).unwrap();
        assert_eq!(back, rev);
    }

    #[test]
    fn revisions_history() {
        let history = vec![Revision::new(3, "c"), Revision::new(2, "b"), Revision::new(1, "a")];
        let revisions = Revisions::from_history(&history).unwrap();
        assert_eq!(revisions.start, 3);
        assert_eq!(revisions.ids, vec!["c", "b", "a"]);
        assert_eq!(revisions.to_history(), history);
        assert!(Revisions::from_history(&[]).is_none());
    }

    proptest! {
        #[test]
        fn display_parse_agree(generation in 1u64..1_000_000, hash in "[0-9a-f]{1,32}") {
            let rev = Revision::new(generation, hash);
            let parsed: Revision = rev.to_string().parse().unwrap();
            prop_assert_eq!(parsed, rev);
        }
    }
}
