//! Replication surface shared by local and remote stores.

use async_trait::async_trait;
use docsync_protocol::{
    ApplyOutcome, ChangesPage, DocumentId, Feed, Revision, RevisionedDocument, RevsDiff,
    RevsDiffRequest, Sequence,
};

/// A store that can take part in replication.
///
/// Replication between two stores only needs these four primitives: list
/// what changed, ask the target what it lacks, fetch those revisions with
/// their ancestry and attachment bytes, and write them to the target
/// without generating new revisions.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Error type of this store.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists changes after `since`, oldest first, at most `limit` entries.
    ///
    /// With [`Feed::LongPoll`] an empty result waits up to the timeout for a
    /// new change before returning.
    async fn changes(
        &self,
        since: &Sequence,
        limit: usize,
        feed: Feed,
    ) -> Result<ChangesPage, Self::Error>;

    /// Returns the offered revisions this store does not have.
    async fn revs_diff(&self, request: &RevsDiffRequest) -> Result<RevsDiff, Self::Error>;

    /// Fetches revisions of one document with ancestry and attachment bytes.
    ///
    /// A revision that is no longer a leaf resolves to the leaf that
    /// descends from it.
    async fn get_revisions(
        &self,
        id: &DocumentId,
        revs: &[Revision],
    ) -> Result<Vec<RevisionedDocument>, Self::Error>;

    /// Stores replicated revisions as-is.
    async fn bulk_replicate(
        &self,
        docs: Vec<RevisionedDocument>,
    ) -> Result<Vec<ApplyOutcome>, Self::Error>;
}
