//! Conflict reporting and replicated-write outcomes.

use crate::document::DocumentId;
use crate::revision::Revision;
use std::cmp::Ordering;

/// Divergent leaves of one document.
///
/// Both stores keep every leaf; the winner is only the revision readers see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Document id.
    pub id: DocumentId,
    /// Winning leaf.
    pub winner: Revision,
    /// Other non-deleted leaves.
    pub losers: Vec<Revision>,
}

/// Orders two leaves by winning priority; the greater leaf wins.
///
/// Live leaves beat tombstones, then the higher revision wins. Every store
/// applying this rule to the same leaves agrees on the winner.
#[must_use]
pub fn compare_leaves(a: (&Revision, bool), b: (&Revision, bool)) -> Ordering {
    let (a_rev, a_deleted) = a;
    let (b_rev, b_deleted) = b;
    b_deleted.cmp(&a_deleted).then_with(|| a_rev.cmp(b_rev))
}

/// Result of applying one replicated revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The revision was stored.
    Applied(DocumentId),
    /// The revision was already known.
    AlreadyPresent(DocumentId),
    /// The revision was stored and left the document with divergent leaves.
    Conflict(Conflict),
    /// The target refused the revision.
    Rejected {
        /// Document id.
        id: DocumentId,
        /// Reason given by the target.
        reason: String,
    },
}

impl ApplyOutcome {
    /// Returns true if the revision is now present on the target.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_leaf_beats_tombstone() {
        let live = Revision::new(1, "a");
        let dead = Revision::new(5, "z");
        assert_eq!(compare_leaves((&live, false), (&dead, true)), Ordering::Greater);
        assert_eq!(compare_leaves((&dead, true), (&live, false)), Ordering::Less);
    }

    #[test]
    fn higher_revision_wins_among_equals() {
        let low = Revision::new(2, "aa");
        let high = Revision::new(2, "bb");
        assert_eq!(compare_leaves((&high, false), (&low, false)), Ordering::Greater);
        assert_eq!(compare_leaves((&high, true), (&low, true)), Ordering::Greater);
    }

    #[test]
    fn rejected_is_not_stored() {
        let id = DocumentId::new("a");
        assert!(ApplyOutcome::Applied(id.clone()).is_stored());
        assert!(!ApplyOutcome::Rejected {
            id,
            reason: "forbidden".into()
        }
        .is_stored());
    }
}
