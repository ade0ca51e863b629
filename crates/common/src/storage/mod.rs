//! Receipt image storage
//!
//! Images are written once on upload, served back to the front end by key
//! and removed together with their receipt.

use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// File extensions accepted as receipt images (lowercase, without the dot)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "svg"];

/// Longest filename stem kept in a storage key
const MAX_STEM_LEN: usize = 64;

/// A stored image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Storage-local name, unique per upload
    pub key: String,
    /// Location on disk, handed to the OCR engine
    pub path: PathBuf,
    /// Reference URL persisted on the receipt
    pub url: String,
}

/// Trait for receipt image storage backends
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Persist the bytes of an uploaded file
    async fn save_file(&self, filename: &str, data: &[u8]) -> Result<StoredFile>;

    /// Read a stored file back by key
    async fn get_file(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove a stored file by key; missing files are not an error
    async fn delete_file(&self, key: &str) -> Result<()>;

    /// Map a reference URL produced by `save_file` back to its key
    fn key_from_url(&self, url: &str) -> Option<String>;

    /// Whether the backend can currently accept uploads
    async fn check(&self) -> Result<()> {
        Ok(())
    }
}

/// Local filesystem storage rooted at a single directory
pub struct LocalStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.upload_dir.clone(), config.public_base_url.clone())
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageProvider for LocalStorage {
    async fn save_file(&self, filename: &str, data: &[u8]) -> Result<StoredFile> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Failed to create {}: {}", self.root.display(), e),
            })?;

        let key = format!("{}-{}", Uuid::new_v4(), sanitize_filename(filename));
        let path = self.path_for(&key)?;

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Failed to write {}: {}", key, e),
            })?;

        tracing::debug!(key = %key, bytes = data.len(), "Stored receipt image");

        Ok(StoredFile {
            url: format!("{}/{}", self.public_base_url, key),
            key,
            path,
        })
    }

    async fn get_file(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound {
                resource_type: "file".to_string(),
                id: key.to_string(),
            }),
            Err(e) => Err(AppError::Storage {
                message: format!("Failed to read {}: {}", key, e),
            }),
        }
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage {
                message: format!("Failed to delete {}: {}", key, e),
            }),
        }
    }

    fn key_from_url(&self, url: &str) -> Option<String> {
        let key = url
            .strip_prefix(&self.public_base_url)?
            .strip_prefix('/')?;

        validate_key(key).ok()?;
        Some(key.to_string())
    }

    async fn check(&self) -> Result<()> {
        let unavailable = |reason: String| AppError::Storage {
            message: format!("Upload directory {} unavailable: {}", self.root.display(), reason),
        };

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let metadata = tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if metadata.permissions().readonly() {
            return Err(unavailable("read-only".to_string()));
        }

        Ok(())
    }
}

/// Create a storage provider based on configuration
pub fn create_storage(config: &StorageConfig) -> Arc<dyn StorageProvider> {
    Arc::new(LocalStorage::from_config(config))
}

/// Lowercased extension of a filename, if any
pub fn file_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Whether the filename carries one of the accepted image extensions
pub fn is_image_file_extension(filename: &str) -> bool {
    file_extension(filename)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Content type served for a stored image
pub fn mime_type_for(filename: &str) -> &'static str {
    match file_extension(filename).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("tiff") => "image/tiff",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Reduce an uploaded filename to `[A-Za-z0-9._-]`, keeping the extension
fn sanitize_filename(filename: &str) -> String {
    // Browsers on Windows may send the full client path
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (base, None),
    };

    let clean = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    };

    let mut stem: String = clean(stem).chars().take(MAX_STEM_LEN).collect();
    if stem.is_empty() {
        stem.push_str("receipt");
    }

    match ext {
        Some(ext) => format!("{}.{}", stem, clean(ext).to_ascii_lowercase()),
        None => stem,
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
        return Err(AppError::Validation {
            message: format!("Invalid storage key: {}", key),
            field: Some("key".to_string()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(dir: &tempfile::TempDir) -> LocalStorage {
        LocalStorage::new(dir.path(), "/uploads/")
    }

    #[test]
    fn test_image_extensions() {
        assert!(is_image_file_extension("receipt.jpg"));
        assert!(is_image_file_extension("RECEIPT.JPEG"));
        assert!(is_image_file_extension("scan.tiff"));
        assert!(is_image_file_extension("logo.svg"));
        assert!(!is_image_file_extension("receipt.pdf"));
        assert!(!is_image_file_extension("notes.txt"));
        assert!(!is_image_file_extension("jpg"));
        assert!(!is_image_file_extension(""));
    }

    #[tokio::test]
    async fn test_check_creates_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("nested/uploads"), "/uploads");

        storage.check().await.unwrap();
        assert!(dir.path().join("nested/uploads").is_dir());
    }

    #[tokio::test]
    async fn test_check_fails_when_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("uploads");
        std::fs::write(&file, b"not a directory").unwrap();

        let err = LocalStorage::new(&file, "/uploads").check().await.unwrap_err();
        assert!(matches!(err, AppError::Storage { .. }));
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type_for("a.JPG"), "image/jpeg");
        assert_eq!(mime_type_for("a.svg"), "image/svg+xml");
        assert_eq!(mime_type_for("a.bin"), "application/octet-stream");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("receipt.JPG"), "receipt.jpg");
        assert_eq!(sanitize_filename("../../etc/passwd.png"), "passwd.png");
        assert_eq!(sanitize_filename("C:\\Users\\me\\my receipt (1).png"), "my_receipt__1_.png");
        assert_eq!(sanitize_filename(".png"), "_png");
    }

    #[tokio::test]
    async fn test_save_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);

        let stored = storage.save_file("receipt.png", b"png-bytes").await.unwrap();
        assert!(stored.key.ends_with("-receipt.png"));
        assert_eq!(stored.url, format!("/uploads/{}", stored.key));
        assert!(stored.path.starts_with(dir.path()));

        assert_eq!(storage.get_file(&stored.key).await.unwrap(), b"png-bytes");
        assert_eq!(storage.key_from_url(&stored.url), Some(stored.key.clone()));

        storage.delete_file(&stored.key).await.unwrap();
        let err = storage.get_file(&stored.key).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));

        // Deleting twice is fine
        storage.delete_file(&stored.key).await.unwrap();
    }

    #[tokio::test]
    async fn test_same_name_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);

        let a = storage.save_file("r.jpg", b"a").await.unwrap();
        let b = storage.save_file("r.jpg", b"b").await.unwrap();

        assert_ne!(a.key, b.key);
        assert_eq!(storage.get_file(&a.key).await.unwrap(), b"a");
        assert_eq!(storage.get_file(&b.key).await.unwrap(), b"b");
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);

        for key in ["../secret.png", "a/b.png", "..", ""] {
            let err = storage.get_file(key).await.unwrap_err();
            assert!(matches!(err, AppError::Validation { .. }), "key {:?}", key);
        }

        assert_eq!(storage.key_from_url("/uploads/../x.png"), None);
        assert_eq!(storage.key_from_url("https://elsewhere/x.png"), None);
    }
}
