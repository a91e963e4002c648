//! Stores uploaded files.

use crate::error::ServerResult;
use crate::files::{generate_name, public_url, FileStore};
use serde::Serialize;
use std::path::Path;

/// Extensions kept on stored uploads. Anything else is stored without one.
pub const ALLOWED_EXTENSIONS: [&str; 8] =
    [".png", ".jpg", ".jpeg", ".gif", ".webp", ".bmp", ".svg", ".avif"];

/// Response body of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    /// Always true.
    pub ok: bool,
    /// Stored file name.
    pub filename: String,
    /// Where the file is served.
    pub url: String,
}

/// Returns the lower-cased extension of `original` if it is allowed.
#[must_use]
pub fn safe_extension(original: &str) -> String {
    let ext = Path::new(original)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        ext
    } else {
        String::new()
    }
}

/// Stores an uploaded file under a generated name.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub async fn store_upload(
    files: &FileStore,
    original_name: Option<&str>,
    data: &[u8],
) -> ServerResult<UploadReceipt> {
    let filename = generate_name(&safe_extension(original_name.unwrap_or("upload")));
    files.write(&filename, data).await?;
    Ok(UploadReceipt {
        ok: true,
        url: public_url(&filename),
        filename,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_extensions_are_kept() {
        assert_eq!(safe_extension("cat.PNG"), ".png");
        assert_eq!(safe_extension("photo.jpeg"), ".jpeg");
        assert_eq!(safe_extension("dir/vector.svg"), ".svg");
    }

    #[test]
    fn other_extensions_are_dropped() {
        assert_eq!(safe_extension("script.sh"), "");
        assert_eq!(safe_extension("noext"), "");
        assert_eq!(safe_extension(".png"), "");
        assert_eq!(safe_extension("archive.tar.gz"), "");
    }

    #[tokio::test]
    async fn store_upload_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileStore::new(dir.path());
        let receipt = store_upload(&files, Some("Me.JPG"), b"jpeg").await.unwrap();

        assert!(receipt.ok);
        assert!(receipt.filename.ends_with(".jpg"));
        assert_eq!(receipt.url, format!("/uploads/{}", receipt.filename));
        assert_eq!(files.read(&receipt.filename).await.unwrap(), b"jpeg");
    }
}
