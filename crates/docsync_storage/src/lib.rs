//! # docsync storage
//!
//! Append-only record journals used by the docsync local store.
//!
//! A journal is a sequence of framed records. Each frame carries a magic
//! marker, the payload length and a checksum, so a torn tail left by a crash
//! is detected and dropped on replay instead of poisoning the store.
//!
//! ## Available Backends
//!
//! - [`MemoryJournal`] - For tests and ephemeral stores
//! - [`FileJournal`] - Persistent, exclusively locked journal file
//!
//! ## Example
//!
//! ```rust
//! use docsync_storage::{JournalBackend, MemoryJournal};
//!
//! let mut journal = MemoryJournal::new();
//! journal.append(b"first").unwrap();
//! journal.append(b"second").unwrap();
//!
//! let replay = journal.replay().unwrap();
//! assert_eq!(replay.records, vec![b"first".to_vec(), b"second".to_vec()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod record;

pub use backend::{JournalBackend, Replay};
pub use error::{StorageError, StorageResult};
pub use file::FileJournal;
pub use memory::MemoryJournal;
pub use record::{decode_records, encode_record, HEADER_SIZE, RECORD_MAGIC};
