//! Per-document revision leaves.

use docsync_protocol::{
    compare_leaves, Attachment, Conflict, Document, DocumentId, Revision, RevisionedDocument,
    Revisions,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A leaf revision with its full body and ancestry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Leaf {
    /// Body at this revision; `revision` is always set.
    pub document: Document,
    /// Ancestry, newest first, starting with this leaf's own revision.
    pub history: Vec<Revision>,
}

impl Leaf {
    pub fn revision(&self) -> Option<&Revision> {
        self.history.first()
    }

    pub fn to_revisioned(&self) -> RevisionedDocument {
        RevisionedDocument {
            document: self.document.clone(),
            revisions: Revisions::from_history(&self.history),
        }
    }
}

/// Result of adding a leaf to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Merge {
    /// The revision was already known.
    Known,
    /// The leaf was added.
    Added,
}

/// All leaves of one document and the sequence of its latest write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct Entry {
    pub leaves: Vec<Leaf>,
    pub seq: u64,
}

impl Entry {
    /// The leaf readers see.
    pub fn winner(&self) -> Option<&Leaf> {
        self.leaves.iter().max_by(|a, b| {
            match (a.revision(), b.revision()) {
                (Some(ra), Some(rb)) => {
                    compare_leaves((ra, a.document.deleted), (rb, b.document.deleted))
                }
                _ => std::cmp::Ordering::Equal,
            }
        })
    }

    /// The winner, unless it is a tombstone.
    pub fn live_winner(&self) -> Option<&Leaf> {
        self.winner().filter(|leaf| !leaf.document.deleted)
    }

    /// Revision of the live winner.
    pub fn current_revision(&self) -> Option<&Revision> {
        self.live_winner().and_then(Leaf::revision)
    }

    /// Every leaf revision, sorted.
    pub fn leaf_revisions(&self) -> Vec<Revision> {
        let mut revs: Vec<Revision> = self.leaves.iter().filter_map(|l| l.revision().cloned()).collect();
        revs.sort();
        revs
    }

    /// Returns true if `rev` is a leaf or an ancestor of one.
    pub fn knows(&self, rev: &Revision) -> bool {
        self.leaves.iter().any(|leaf| leaf.history.contains(rev))
    }

    /// Finds the leaf that is, or descends from, `rev`.
    pub fn leaf_for(&self, rev: &Revision) -> Option<&Leaf> {
        self.leaves
            .iter()
            .find(|leaf| leaf.revision() == Some(rev))
            .or_else(|| self.leaves.iter().find(|leaf| leaf.history.contains(rev)))
    }

    /// Adds a leaf, replacing any leaf it extends.
    ///
    /// Stub attachments inherit bytes from an existing leaf holding the
    /// same attachment name.
    pub fn merge(&mut self, mut leaf: Leaf) -> Merge {
        let Some(rev) = leaf.revision().cloned() else {
            return Merge::Known;
        };
        if self.knows(&rev) {
            return Merge::Known;
        }

        self.fill_stubs(&mut leaf.document.attachments, Some(leaf.history.as_slice()));
        self.leaves.retain(|existing| {
            existing
                .revision()
                .map_or(true, |r| !leaf.history.contains(r))
        });
        self.leaves.push(leaf);
        Merge::Added
    }

    /// Replaces stub attachments with bytes from the closest known leaf.
    pub fn fill_stubs(
        &self,
        attachments: &mut BTreeMap<String, Attachment>,
        history: Option<&[Revision]>,
    ) {
        for (name, attachment) in attachments.iter_mut() {
            if !attachment.is_stub() {
                continue;
            }
            let source = self
                .leaves
                .iter()
                .filter(|leaf| {
                    history.map_or(true, |h| leaf.revision().map_or(false, |r| h.contains(r)))
                })
                .chain(self.leaves.iter())
                .find_map(|leaf| {
                    leaf.document
                        .attachments
                        .get(name)
                        .filter(|candidate| !candidate.is_stub())
                });
            if let Some(source) = source {
                *attachment = Attachment {
                    content_type: attachment.content_type.clone(),
                    digest: attachment.digest.clone().or(source.digest.clone()),
                    revpos: attachment.revpos.or(source.revpos),
                    ..source.clone()
                };
            }
        }
    }

    /// Reports divergent live leaves, if any.
    pub fn conflict(&self, id: &DocumentId) -> Option<Conflict> {
        let winner = self.winner()?.revision()?.clone();
        let losers: Vec<Revision> = self
            .leaves
            .iter()
            .filter(|leaf| !leaf.document.deleted)
            .filter_map(|leaf| leaf.revision().cloned())
            .filter(|rev| *rev != winner)
            .collect();
        if losers.is_empty() {
            None
        } else {
            Some(Conflict {
                id: id.clone(),
                winner,
                losers,
            })
        }
    }
}
