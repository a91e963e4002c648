//! File-based journal for persistent stores.

use crate::backend::{JournalBackend, Replay};
use crate::error::{StorageError, StorageResult};
use crate::record::{decode_records, encode_record};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A journal stored in a single file.
///
/// The file is exclusively locked for as long as the journal is open, so two
/// processes can never interleave writes into the same store.
///
/// # Durability
///
/// - `append()` writes the frame but leaves flushing to the OS
/// - `sync()` calls `File::sync_all()`
/// - `rewrite()` writes a sibling temp file, syncs it and renames it over
///   the journal
///
/// # Example
///
/// ```no_run
/// use docsync_storage::{FileJournal, JournalBackend};
/// use std::path::Path;
///
/// let mut journal = FileJournal::open(Path::new("data/store.journal")).unwrap();
/// journal.append(b"persistent record").unwrap();
/// journal.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileJournal {
    path: PathBuf,
    file: File,
    size: u64,
}

impl FileJournal {
    /// Opens or creates the journal at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Locked`] if another handle holds the journal,
    /// or an I/O error if the file cannot be opened.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = Self::open_locked(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            size,
        })
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_locked(path: &Path) -> StorageResult<File> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        file.try_lock_exclusive()
            .map_err(|_| StorageError::Locked {
                path: path.to_path_buf(),
            })?;
        Ok(file)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl JournalBackend for FileJournal {
    fn append(&mut self, payload: &[u8]) -> StorageResult<u64> {
        let frame = encode_record(payload)?;
        let offset = self.size;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&frame)?;
        self.size += frame.len() as u64;
        Ok(offset)
    }

    fn replay(&mut self) -> StorageResult<Replay> {
        let mut bytes = Vec::new();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_to_end(&mut bytes)?;

        let (records, valid) = decode_records(&bytes);
        let truncated_bytes = (bytes.len() - valid) as u64;
        if truncated_bytes > 0 {
            tracing::warn!(
                path = %self.path.display(),
                truncated_bytes,
                "dropping torn journal tail"
            );
            self.file.set_len(valid as u64)?;
            self.file.sync_all()?;
        }
        self.size = valid as u64;

        Ok(Replay {
            records,
            truncated_bytes,
        })
    }

    fn rewrite(&mut self, payloads: &[Vec<u8>]) -> StorageResult<()> {
        let temp = self.temp_path();
        let mut size = 0u64;
        {
            let mut out = File::create(&temp)?;
            for payload in payloads {
                let frame = encode_record(payload)?;
                out.write_all(&frame)?;
                size += frame.len() as u64;
            }
            out.sync_all()?;
        }

        fs::rename(&temp, &self.path)?;
        // The old handle still points at the replaced inode; its lock goes
        // with it when dropped below.
        let file = Self::open_locked(&self.path)?;
        let _ = FileExt::unlock(&self.file);
        self.file = file;
        self.size = size;

        tracing::debug!(
            path = %self.path.display(),
            records = payloads.len(),
            bytes = size,
            "journal rewritten"
        );
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }
}
