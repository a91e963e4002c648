//! The embedded local document store.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::store::DocumentStore;
use crate::tree::{Entry, Leaf, Merge};
use async_trait::async_trait;
use docsync_protocol::{
    strip_reserved, ApplyOutcome, Attachment, Change, ChangesPage, Conflict, Document,
    DocumentId, Feed, Revision, RevisionedDocument, RevsDiff, RevsDiffRequest, Sequence,
};
use docsync_storage::{FileJournal, JournalBackend, MemoryJournal, StorageError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::sync::watch;

/// File name of the journal inside a store directory.
const JOURNAL_FILE: &str = "docsync.journal";

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum RecordRef<'a> {
    Entry { id: &'a DocumentId, entry: &'a Entry },
    Checkpoint { key: &'a str, seq: &'a Sequence },
}

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Record {
    Entry { id: DocumentId, entry: Entry },
    Checkpoint { key: String, seq: Sequence },
}

struct Inner {
    docs: BTreeMap<DocumentId, Entry>,
    checkpoints: BTreeMap<String, Sequence>,
    update_seq: u64,
    journal: Box<dyn JournalBackend>,
    compacted_size: u64,
}

impl Inner {
    fn snapshot(&self) -> CoreResult<Vec<Vec<u8>>> {
        let mut payloads = Vec::with_capacity(self.docs.len() + self.checkpoints.len());
        for (id, entry) in &self.docs {
            payloads.push(serde_json::to_vec(&RecordRef::Entry { id, entry })?);
        }
        for (key, seq) in &self.checkpoints {
            payloads.push(serde_json::to_vec(&RecordRef::Checkpoint { key, seq })?);
        }
        Ok(payloads)
    }
}

/// An embedded document store owned by one process.
///
/// Every document keeps its leaf revisions with full bodies, attachment bytes
/// and ancestry, so it can replicate with a CouchDB-style peer and keep
/// conflicting branches until someone resolves them. Mutations are appended
/// to a checksummed journal and replayed on open.
///
/// # Example
///
/// ```rust
/// use docsync_core::LocalStore;
/// use docsync_protocol::Document;
///
/// let store = LocalStore::in_memory();
/// let saved = store.put(Document::submission(Default::default())).unwrap();
/// assert_eq!(store.get(&saved.id).unwrap().revision, saved.revision);
/// ```
pub struct LocalStore {
    inner: Mutex<Inner>,
    seq_tx: watch::Sender<u64>,
    config: StoreConfig,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("update_seq", &*self.seq_tx.borrow())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LocalStore {
    /// Opens (or creates) a persistent store in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Locked`] if another process owns the directory,
    /// or an error if the journal cannot be read.
    pub fn open(dir: &Path, config: StoreConfig) -> CoreResult<Self> {
        let journal = FileJournal::open(&dir.join(JOURNAL_FILE)).map_err(|err| match err {
            StorageError::Locked { path } => CoreError::Locked { path },
            other => CoreError::Storage(other),
        })?;
        Self::with_journal(Box::new(journal), config)
    }

    /// Creates an empty store that lives only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_parts(
            Box::new(MemoryJournal::new()),
            StoreConfig::default().with_sync_on_write(false),
            BTreeMap::new(),
            BTreeMap::new(),
            0,
        )
    }

    /// Opens a store over an arbitrary journal backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be replayed.
    pub fn with_journal(mut journal: Box<dyn JournalBackend>, config: StoreConfig) -> CoreResult<Self> {
        let replay = journal.replay()?;
        if replay.truncated_bytes > 0 {
            tracing::warn!(
                truncated_bytes = replay.truncated_bytes,
                "recovered local store from a torn journal"
            );
        }

        let mut docs = BTreeMap::new();
        let mut checkpoints = BTreeMap::new();
        let mut update_seq = 0;
        for payload in &replay.records {
            match serde_json::from_slice::<Record>(payload)? {
                Record::Entry { id, entry } => {
                    update_seq = update_seq.max(entry.seq);
                    docs.insert(id, entry);
                }
                Record::Checkpoint { key, seq } => {
                    checkpoints.insert(key, seq);
                }
            }
        }

        tracing::info!(
            documents = docs.len(),
            records = replay.records.len(),
            update_seq,
            "local store opened"
        );
        Ok(Self::from_parts(journal, config, docs, checkpoints, update_seq))
    }

    fn from_parts(
        journal: Box<dyn JournalBackend>,
        config: StoreConfig,
        docs: BTreeMap<DocumentId, Entry>,
        checkpoints: BTreeMap<String, Sequence>,
        update_seq: u64,
    ) -> Self {
        let compacted_size = journal.size().unwrap_or(0);
        let (seq_tx, _) = watch::channel(update_seq);
        Self {
            inner: Mutex::new(Inner {
                docs,
                checkpoints,
                update_seq,
                journal,
                compacted_size,
            }),
            seq_tx,
            config,
        }
    }

    /// Writes a document.
    ///
    /// A document without a revision creates a new id (or resurrects a
    /// deleted one). Otherwise its revision must be the current one. Stub
    /// attachments keep the bytes of the revision being replaced.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Conflict`] on a stale or missing revision and
    /// [`CoreError::NotFound`] when updating an unknown id.
    pub fn put(&self, mut doc: Document) -> CoreResult<Document> {
        strip_reserved(&mut doc.fields);
        doc.deleted = false;

        let mut inner = self.inner.lock();
        let entry = inner.docs.get(&doc.id).cloned().unwrap_or_default();
        if entry.leaves.is_empty() && doc.revision.is_some() {
            return Err(CoreError::NotFound { id: doc.id });
        }

        let current = entry.current_revision().cloned();
        if doc.revision != current {
            return Err(CoreError::Conflict {
                id: doc.id,
                expected: doc.revision,
                actual: current,
            });
        }

        let parent = entry.winner().cloned();
        self.write_leaf(&mut inner, entry, doc, parent)
    }

    /// Deletes a document by writing a tombstone revision.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the document is absent or already
    /// deleted, and [`CoreError::Conflict`] if `revision` is stale.
    pub fn remove(&self, id: &DocumentId, revision: Option<&Revision>) -> CoreResult<Revision> {
        let mut inner = self.inner.lock();
        let entry = inner.docs.get(id).cloned().unwrap_or_default();
        let Some(parent) = entry.live_winner().cloned() else {
            return Err(CoreError::NotFound { id: id.clone() });
        };

        let current = parent.revision().cloned();
        if revision != current.as_ref() {
            return Err(CoreError::Conflict {
                id: id.clone(),
                expected: revision.cloned(),
                actual: current,
            });
        }

        let tombstone = parent.document.tombstone();
        let written = self.write_leaf(&mut inner, entry, tombstone, Some(parent))?;
        written
            .revision
            .ok_or_else(|| CoreError::InvalidDocument("tombstone without revision".into()))
    }

    fn write_leaf(
        &self,
        inner: &mut Inner,
        mut entry: Entry,
        mut doc: Document,
        parent: Option<Leaf>,
    ) -> CoreResult<Document> {
        let parent_rev = parent.as_ref().and_then(|p| p.revision().cloned());
        let generation = parent_rev.as_ref().map_or(1, |r| r.generation() + 1);

        entry.fill_stubs(
            &mut doc.attachments,
            parent.as_ref().map(|p| p.history.as_slice()),
        );
        for attachment in doc.attachments.values_mut() {
            if let Some(data) = &attachment.data {
                attachment.length = Some(data.len() as u64);
            }
            attachment.revpos.get_or_insert(generation);
        }

        let revision = Revision::derive(parent_rev.as_ref(), doc.deleted, &doc.content_value());
        doc.revision = Some(revision.clone());

        let mut history = vec![revision];
        if let Some(parent) = &parent {
            history.extend(parent.history.iter().cloned());
        }
        history.truncate(self.config.revs_limit.max(1));

        entry
            .leaves
            .retain(|leaf| leaf.revision() != parent_rev.as_ref());
        entry.leaves.push(Leaf {
            document: doc.clone(),
            history,
        });

        let seq = self.commit(inner, &doc.id, entry)?;
        tracing::debug!(id = %doc.id, rev = ?doc.revision, seq, deleted = doc.deleted, "local write");
        Ok(doc)
    }

    fn commit(&self, inner: &mut Inner, id: &DocumentId, mut entry: Entry) -> CoreResult<u64> {
        let seq = inner.update_seq + 1;
        entry.seq = seq;

        let payload = serde_json::to_vec(&RecordRef::Entry { id, entry: &entry })?;
        inner.journal.append(&payload)?;
        if self.config.sync_on_write {
            inner.journal.sync()?;
        }

        inner.update_seq = seq;
        inner.docs.insert(id.clone(), entry);
        self.maybe_compact(inner);
        self.seq_tx.send_replace(seq);
        Ok(seq)
    }

    fn maybe_compact(&self, inner: &mut Inner) {
        let size = match inner.journal.size() {
            Ok(size) => size,
            Err(err) => {
                tracing::warn!(error = %err, "cannot read journal size");
                return;
            }
        };
        if size <= self.config.compact_after_bytes || size <= inner.compacted_size.saturating_mul(2) {
            return;
        }
        if let Err(err) = Self::compact_locked(inner) {
            tracing::warn!(error = %err, "journal compaction failed");
        }
    }

    fn compact_locked(inner: &mut Inner) -> CoreResult<()> {
        let before = inner.journal.size()?;
        let payloads = inner.snapshot()?;
        inner.journal.rewrite(&payloads)?;
        inner.compacted_size = inner.journal.size()?;
        tracing::info!(before, after = inner.compacted_size, "journal compacted");
        Ok(())
    }

    /// Rewrites the journal from live state.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite fails; the old journal stays in place.
    pub fn compact(&self) -> CoreResult<()> {
        Self::compact_locked(&mut self.inner.lock())
    }

    /// Returns the current (non-deleted) document with attachment bytes.
    #[must_use]
    pub fn get(&self, id: &DocumentId) -> Option<Document> {
        let inner = self.inner.lock();
        inner
            .docs
            .get(id)
            .and_then(Entry::live_winner)
            .map(|leaf| leaf.document.clone())
    }

    /// Returns every non-deleted document, attachments as stubs, by id.
    #[must_use]
    pub fn all_docs(&self) -> Vec<Document> {
        let inner = self.inner.lock();
        inner
            .docs
            .values()
            .filter_map(Entry::live_winner)
            .map(|leaf| {
                let mut doc = leaf.document.clone();
                for attachment in doc.attachments.values_mut() {
                    *attachment = attachment.to_stub();
                }
                doc
            })
            .collect()
    }

    /// Returns an attachment of the current revision with its bytes.
    #[must_use]
    pub fn get_attachment(&self, id: &DocumentId, name: &str) -> Option<Attachment> {
        let inner = self.inner.lock();
        inner
            .docs
            .get(id)
            .and_then(Entry::live_winner)
            .and_then(|leaf| leaf.document.attachments.get(name))
            .filter(|attachment| !attachment.is_stub())
            .cloned()
    }

    /// Returns the number of non-deleted documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.docs.values().filter(|e| e.live_winner().is_some()).count()
    }

    /// Returns the stored replication checkpoint for `key`.
    #[must_use]
    pub fn checkpoint(&self, key: &str) -> Option<Sequence> {
        self.inner.lock().checkpoints.get(key).cloned()
    }

    /// Persists a replication checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal write fails.
    pub fn set_checkpoint(&self, key: &str, seq: &Sequence) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.checkpoints.get(key) == Some(seq) {
            return Ok(());
        }
        let payload = serde_json::to_vec(&RecordRef::Checkpoint { key, seq })?;
        inner.journal.append(&payload)?;
        if self.config.sync_on_write {
            inner.journal.sync()?;
        }
        inner.checkpoints.insert(key.to_string(), seq.clone());
        self.maybe_compact(&mut inner);
        Ok(())
    }

    /// Returns the current update sequence.
    #[must_use]
    pub fn update_seq(&self) -> u64 {
        self.inner.lock().update_seq
    }

    /// Subscribes to update sequence changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.seq_tx.subscribe()
    }

    /// Lists documents that currently have divergent live leaves.
    #[must_use]
    pub fn conflicts(&self) -> Vec<Conflict> {
        let inner = self.inner.lock();
        inner
            .docs
            .iter()
            .filter_map(|(id, entry)| entry.conflict(id))
            .collect()
    }

    /// Makes every write durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal sync fails.
    pub fn flush(&self) -> CoreResult<()> {
        self.inner.lock().journal.sync()?;
        Ok(())
    }

    fn changes_since(&self, since: &Sequence, limit: usize) -> ChangesPage {
        let since = since.as_u64().unwrap_or(0);
        let inner = self.inner.lock();

        let mut changed: Vec<(&DocumentId, &Entry)> =
            inner.docs.iter().filter(|(_, e)| e.seq > since).collect();
        changed.sort_by_key(|(_, e)| e.seq);

        let total = changed.len();
        let results: Vec<Change> = changed
            .into_iter()
            .take(limit.max(1))
            .map(|(id, entry)| Change {
                seq: Sequence::from_u64(entry.seq),
                id: id.clone(),
                revs: entry.leaf_revisions(),
                deleted: entry.winner().map_or(false, |leaf| leaf.document.deleted),
            })
            .collect();

        let last_seq = results
            .last()
            .map(|change| change.seq.clone())
            .unwrap_or_else(|| Sequence::from_u64(inner.update_seq));
        let pending = (total - results.len()) as u64;

        ChangesPage {
            results,
            last_seq,
            pending: Some(pending),
        }
    }

    fn diff(&self, request: &RevsDiffRequest) -> RevsDiff {
        let inner = self.inner.lock();
        request
            .iter()
            .filter_map(|(id, revs)| {
                let missing: Vec<Revision> = match inner.docs.get(id) {
                    Some(entry) => revs.iter().filter(|r| !entry.knows(r)).cloned().collect(),
                    None => revs.clone(),
                };
                (!missing.is_empty()).then(|| (id.clone(), missing))
            })
            .collect()
    }

    fn revisions(&self, id: &DocumentId, revs: &[Revision]) -> Vec<RevisionedDocument> {
        let inner = self.inner.lock();
        let Some(entry) = inner.docs.get(id) else {
            return Vec::new();
        };

        let mut seen = Vec::new();
        let mut docs = Vec::new();
        for rev in revs {
            if let Some(leaf) = entry.leaf_for(rev) {
                if !seen.contains(&leaf.revision()) {
                    seen.push(leaf.revision());
                    docs.push(leaf.to_revisioned());
                }
            }
        }
        docs
    }

    fn apply_replicated(&self, docs: Vec<RevisionedDocument>) -> CoreResult<Vec<ApplyOutcome>> {
        let mut outcomes = Vec::with_capacity(docs.len());
        let mut inner = self.inner.lock();

        for incoming in docs {
            let history = incoming.history();
            let mut document = incoming.document;
            let id = document.id.clone();
            if history.is_empty() {
                outcomes.push(ApplyOutcome::Rejected {
                    id,
                    reason: "revision missing".to_string(),
                });
                continue;
            }
            document.revision = history.first().cloned();
            strip_reserved(&mut document.fields);

            let mut entry = inner.docs.get(&id).cloned().unwrap_or_default();
            match entry.merge(Leaf { document, history }) {
                Merge::Known => outcomes.push(ApplyOutcome::AlreadyPresent(id)),
                Merge::Added => {
                    let conflict = entry.conflict(&id);
                    self.commit(&mut inner, &id, entry)?;
                    match conflict {
                        Some(conflict) => {
                            tracing::warn!(
                                id = %conflict.id,
                                winner = %conflict.winner,
                                losers = conflict.losers.len(),
                                "replicated revision left a conflict"
                            );
                            outcomes.push(ApplyOutcome::Conflict(conflict));
                        }
                        None => outcomes.push(ApplyOutcome::Applied(id)),
                    }
                }
            }
        }
        Ok(outcomes)
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    type Error = CoreError;

    async fn changes(
        &self,
        since: &Sequence,
        limit: usize,
        feed: Feed,
    ) -> CoreResult<ChangesPage> {
        let mut updates = self.subscribe();
        let page = self.changes_since(since, limit);

        let Feed::LongPoll(timeout) = feed else {
            return Ok(page);
        };
        if !page.results.is_empty() {
            return Ok(page);
        }

        let since_seq = since.as_u64().unwrap_or(0);
        let wait = async {
            loop {
                let current = *updates.borrow_and_update();
                if current > since_seq || updates.changed().await.is_err() {
                    break;
                }
            }
        };
        let _ = tokio::time::timeout(timeout, wait).await;
        Ok(self.changes_since(since, limit))
    }

    async fn revs_diff(&self, request: &RevsDiffRequest) -> CoreResult<RevsDiff> {
        Ok(self.diff(request))
    }

    async fn get_revisions(
        &self,
        id: &DocumentId,
        revs: &[Revision],
    ) -> CoreResult<Vec<RevisionedDocument>> {
        Ok(self.revisions(id, revs))
    }

    async fn bulk_replicate(
        &self,
        docs: Vec<RevisionedDocument>,
    ) -> CoreResult<Vec<ApplyOutcome>> {
        self.apply_replicated(docs)
    }
}
