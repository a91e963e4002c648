//! Error types for journal operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for journal operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing a journal.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal contents are not a valid record stream.
    #[error("journal corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the journal lock.
    #[error("journal {path:?} is locked by another process")]
    Locked {
        /// Path of the locked journal file.
        path: PathBuf,
    },

    /// A single record exceeds the frame size limit.
    #[error("record of {len} bytes exceeds the frame limit")]
    RecordTooLarge {
        /// Payload length in bytes.
        len: usize,
    },
}
