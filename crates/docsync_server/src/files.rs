//! Durable file storage for uploads and migrated attachments.

use crate::error::{ServerError, ServerResult};
use chrono::Utc;
use rand::Rng;
use std::path::{Path, PathBuf};
use tracing::debug;

/// URL prefix under which stored files are served.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// A flat directory of stored files.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes `data` under `name`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for names that are not a single path component,
    /// or an I/O error if the write fails.
    pub async fn write(&self, name: &str, data: &[u8]) -> ServerResult<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ServerError::Validation(format!("invalid file name {name:?}")));
        }
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(name);
        tokio::fs::write(&path, data).await?;
        debug!(path = %path.display(), bytes = data.len(), "stored file");
        Ok(path)
    }

    /// Reads a stored file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub async fn read(&self, name: &str) -> ServerResult<Vec<u8>> {
        Ok(tokio::fs::read(self.root.join(name)).await?)
    }
}

/// Generates `{16 hex chars}-{unix millis}{ext}`.
#[must_use]
pub fn generate_name(ext: &str) -> String {
    let mut random = [0u8; 8];
    rand::thread_rng().fill(&mut random);
    format!("{}-{}{ext}", hex::encode(random), Utc::now().timestamp_millis())
}

/// Public URL of a stored file.
#[must_use]
pub fn public_url(name: &str) -> String {
    format!("{PUBLIC_PREFIX}/{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_have_expected_shape() {
        let name = generate_name(".png");
        let (random, rest) = name.split_once('-').unwrap();
        assert_eq!(random.len(), 16);
        assert!(random.chars().all(|c| c.is_ascii_hexdigit()));
        let millis = rest.strip_suffix(".png").unwrap();
        assert!(millis.parse::<i64>().unwrap() > 0);

        assert_ne!(generate_name(""), generate_name(""));
    }

    #[test]
    fn public_urls() {
        assert_eq!(public_url("a.png"), "/uploads/a.png");
    }

    #[tokio::test]
    async fn write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested"));
        let path = store.write("x.bin", b"bytes").await.unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(store.read("x.bin").await.unwrap(), b"bytes");
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(
            store.write("../escape", b"x").await,
            Err(ServerError::Validation(_))
        ));
        assert!(store.write("", b"x").await.is_err());
    }
}
