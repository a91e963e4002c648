//! Journal backend trait definition.

use crate::error::StorageResult;

/// Records recovered from a journal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replay {
    /// Payloads of every intact record, in append order.
    pub records: Vec<Vec<u8>>,
    /// Bytes dropped from the tail because they did not form a valid record.
    pub truncated_bytes: u64,
}

/// A durable, append-only record log.
///
/// Backends only frame and checksum opaque payloads; the local store owns
/// what the payloads mean.
///
/// # Invariants
///
/// - `replay` returns every record appended since the last `rewrite`, in order
/// - a partially written trailing record is dropped (and physically removed)
///   by `replay`, never returned
/// - `rewrite` atomically replaces the whole journal
pub trait JournalBackend: Send + Sync {
    /// Appends one record and returns the offset of its frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is too large or an I/O error occurs.
    fn append(&mut self, payload: &[u8]) -> StorageResult<u64>;

    /// Reads back every intact record, truncating a torn tail.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read.
    fn replay(&mut self) -> StorageResult<Replay>;

    /// Replaces the journal contents with exactly `payloads`.
    ///
    /// Used for compaction once the log has grown past its live state.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement cannot be made durable.
    fn rewrite(&mut self, payloads: &[Vec<u8>]) -> StorageResult<()>;

    /// Makes all appended records durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Returns the journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;
}
