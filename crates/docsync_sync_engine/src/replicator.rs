//! One-directional batch replication between two stores.

use crate::error::{SyncError, SyncResult};
use docsync_core::DocumentStore;
use docsync_protocol::{ApplyOutcome, ChangesPage, Conflict, DocumentId, Feed, RevsDiff, RevsDiffRequest, Sequence};
use tracing::{debug, trace, warn};

/// A page of source changes and what the target lacks from it.
#[derive(Debug)]
pub(crate) struct Plan {
    pub page: ChangesPage,
    pub missing: RevsDiff,
}

impl Plan {
    pub fn has_work(&self) -> bool {
        self.missing.values().any(|revs| !revs.is_empty())
    }
}

/// What a transfer wrote.
#[derive(Debug, Default)]
pub(crate) struct Transfer {
    pub written: usize,
    pub conflicts: Vec<Conflict>,
    pub rejected: Vec<(DocumentId, String)>,
}

/// Reads the next page of changes after `since` and asks the target which
/// of those revisions it is missing.
pub(crate) async fn plan<S, T>(
    source: &S,
    target: &T,
    since: &Sequence,
    batch_size: usize,
) -> SyncResult<Plan>
where
    S: DocumentStore + ?Sized,
    T: DocumentStore + ?Sized,
    SyncError: From<S::Error> + From<T::Error>,
{
    let page = source.changes(since, batch_size, Feed::Normal).await?;
    if page.results.is_empty() {
        return Ok(Plan {
            page,
            missing: RevsDiff::new(),
        });
    }

    let mut request = RevsDiffRequest::new();
    for change in &page.results {
        let revs = request.entry(change.id.clone()).or_default();
        for rev in &change.revs {
            if !revs.contains(rev) {
                revs.push(rev.clone());
            }
        }
    }

    let missing = target.revs_diff(&request).await?;
    trace!(offered = request.len(), missing = missing.len(), "compared revisions");
    Ok(Plan { page, missing })
}

/// Copies the missing revisions from `source` to `target`.
///
/// A document the source cannot decode is reported as rejected so the
/// batch, and its checkpoint, can move past it.
pub(crate) async fn transfer<S, T>(source: &S, target: &T, missing: &RevsDiff) -> SyncResult<Transfer>
where
    S: DocumentStore + ?Sized,
    T: DocumentStore + ?Sized,
    SyncError: From<S::Error> + From<T::Error>,
{
    let mut result = Transfer::default();
    let mut docs = Vec::new();
    for (id, revs) in missing {
        if revs.is_empty() {
            continue;
        }
        match source.get_revisions(id, revs).await.map_err(SyncError::from) {
            Ok(found) => docs.extend(found),
            Err(err) if err.is_unreadable_document() => {
                warn!(%id, error = %err, "skipping unreadable document");
                result.rejected.push((id.clone(), err.to_string()));
            }
            Err(err) => return Err(err),
        }
    }
    if docs.is_empty() {
        return Ok(result);
    }

    let outcomes = target.bulk_replicate(docs).await?;
    for outcome in outcomes {
        match outcome {
            ApplyOutcome::Applied(_) => result.written += 1,
            ApplyOutcome::AlreadyPresent(_) => {}
            ApplyOutcome::Conflict(conflict) => {
                result.written += 1;
                result.conflicts.push(conflict);
            }
            ApplyOutcome::Rejected { id, reason } => {
                debug!(%id, %reason, "target rejected revision");
                result.rejected.push((id, reason));
            }
        }
    }
    Ok(result)
}
