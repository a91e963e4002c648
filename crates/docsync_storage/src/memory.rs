//! In-memory journal for tests and ephemeral stores.

use crate::backend::{JournalBackend, Replay};
use crate::error::StorageResult;
use crate::record::{decode_records, encode_record};

/// A journal kept entirely in memory.
///
/// Nothing survives the process; useful for tests and for stores that are
/// rebuilt from the remote on every start.
///
/// # Example
///
/// ```rust
/// use docsync_storage::{JournalBackend, MemoryJournal};
///
/// let mut journal = MemoryJournal::new();
/// let offset = journal.append(b"record").unwrap();
/// assert_eq!(offset, 0);
/// ```
#[derive(Debug, Default)]
pub struct MemoryJournal {
    data: Vec<u8>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a journal over raw bytes, e.g. to exercise crash recovery.
    #[must_use]
    pub fn with_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Returns a copy of the raw journal bytes.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.data.clone()
    }
}

impl JournalBackend for MemoryJournal {
    fn append(&mut self, payload: &[u8]) -> StorageResult<u64> {
        let frame = encode_record(payload)?;
        let offset = self.data.len() as u64;
        self.data.extend_from_slice(&frame);
        Ok(offset)
    }

    fn replay(&mut self) -> StorageResult<Replay> {
        let (records, valid) = decode_records(&self.data);
        let truncated_bytes = (self.data.len() - valid) as u64;
        self.data.truncate(valid);
        Ok(Replay {
            records,
            truncated_bytes,
        })
    }

    fn rewrite(&mut self, payloads: &[Vec<u8>]) -> StorageResult<()> {
        let mut data = Vec::new();
        for payload in payloads {
            data.extend(encode_record(payload)?);
        }
        self.data = data;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.data.len() as u64)
    }
}
