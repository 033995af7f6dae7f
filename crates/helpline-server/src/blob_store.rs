//! Attachment blob storage.
//!
//! The [`BlobStore`] trait is the seam between the upload pipeline and the
//! actual storage backend.  The default backend writes files under a local
//! directory and serves them back through the `/blobs` route; a hosted
//! asset service could implement the same trait without touching the rest
//! of the server.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    #[error("Blob storage error: {0}")]
    Storage(String),
}

/// Metadata for one stored file, as recorded on the ticket.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    /// Public URL the file can be fetched from.
    pub url: String,
    /// Backend handle used for later deletion, `folder/name` for the
    /// filesystem backend.
    pub public_id: String,
    /// `"image"` or `"raw"`.
    pub resource_type: String,
    /// Lowercased file extension, when the original name had one.
    pub format: Option<String>,
    /// Stored size in bytes.
    pub bytes: u64,
}

/// Storage backend for attachment files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store one file under the given folder and return its metadata.
    async fn upload(
        &self,
        data: Bytes,
        original_filename: &str,
        content_type: Option<&str>,
        folder: &str,
    ) -> Result<StoredBlob, BlobError>;

    /// Delete a previously stored file by its public id.
    async fn delete(&self, public_id: &str) -> Result<(), BlobError>;
}

/// Classify a file as `"image"` or `"raw"` from its declared content type,
/// falling back to the filename extension.
pub(crate) fn classify(content_type: Option<&str>, format: Option<&str>) -> &'static str {
    if let Some(ct) = content_type {
        if ct.starts_with("image/") {
            return "image";
        }
    }
    match format {
        Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "bmp") => "image",
        _ => "raw",
    }
}

/// One plain path segment: non-empty, no separators, no traversal.
fn checked_segment(segment: &str) -> Result<&str, BlobError> {
    let ok = !segment.is_empty()
        && !segment.contains("..")
        && !segment.contains(['/', '\\', ':']);
    if !ok {
        return Err(BlobError::InvalidPath(format!(
            "Unsafe path segment: {segment:?}"
        )));
    }
    Ok(segment)
}

/// Local-filesystem blob store.
///
/// Files are stored as `<base>/<folder>/<uuid>.<ext>` and served back under
/// `<public_base_url>/blobs/<folder>/<name>`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl FsBlobStore {
    pub async fn new(base_path: PathBuf, public_base_url: String) -> Result<Self, BlobError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            BlobError::Storage(format!("Blob root '{}': {}", base_path.display(), e))
        })?;

        info!(path = %base_path.display(), "Attachment storage ready");

        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Read a stored file back for the serving route.
    pub async fn read_blob(&self, folder: &str, name: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.blob_path(folder, name)?;

        if !path.exists() {
            return Err(BlobError::NotFound(format!("{}/{}", folder, name)));
        }

        let data = fs::read(&path).await.map_err(|e| {
            BlobError::Storage(format!("Failed to read blob {}/{}: {}", folder, name, e))
        })?;

        debug!(folder = %folder, name = %name, size = data.len(), "Retrieved blob");
        Ok(data)
    }

    /// Resolve `<base>/<folder>/<name>`.  Both segments must be plain
    /// components, so the joined path cannot leave the base directory.
    fn blob_path(&self, folder: &str, name: &str) -> Result<PathBuf, BlobError> {
        let path = self
            .base_path
            .join(checked_segment(folder)?)
            .join(checked_segment(name)?);
        debug_assert!(path.starts_with(&self.base_path));
        Ok(path)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(
        &self,
        data: Bytes,
        original_filename: &str,
        content_type: Option<&str>,
        folder: &str,
    ) -> Result<StoredBlob, BlobError> {
        let format = Path::new(original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        // Stored names are server-minted, the original filename only
        // survives in the ticket metadata.
        let name = match &format {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };

        let path = self.blob_path(folder, &name)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                BlobError::Storage(format!("Failed to create folder '{}': {}", folder, e))
            })?;
        }

        fs::write(&path, &data)
            .await
            .map_err(|e| BlobError::Storage(format!("Failed to write blob {}: {}", name, e)))?;

        let public_id = format!("{}/{}", folder, name);
        let url = format!("{}/blobs/{}", self.public_base_url, public_id);
        let resource_type = classify(content_type, format.as_deref()).to_string();

        debug!(public_id = %public_id, size = data.len(), "Stored blob");

        Ok(StoredBlob {
            url,
            public_id,
            resource_type,
            format,
            bytes: data.len() as u64,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), BlobError> {
        let (folder, name) = public_id
            .split_once('/')
            .ok_or_else(|| BlobError::InvalidPath(format!("Malformed public id: {}", public_id)))?;
        let path = self.blob_path(folder, name)?;

        if !path.exists() {
            return Err(BlobError::NotFound(public_id.to_string()));
        }

        fs::remove_file(&path)
            .await
            .map_err(|e| BlobError::Storage(format!("Failed to delete blob {}: {}", public_id, e)))?;

        debug!(public_id = %public_id, "Deleted blob");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (FsBlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(
            dir.path().to_path_buf(),
            "http://localhost:8080/".to_string(),
        )
        .await
        .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_upload_and_read() {
        let (store, _dir) = test_store().await;

        let blob = store
            .upload(
                Bytes::from_static(b"screenshot-bytes"),
                "crash.png",
                Some("image/png"),
                "intake",
            )
            .await
            .unwrap();

        assert!(blob.public_id.starts_with("intake/"));
        assert!(blob.public_id.ends_with(".png"));
        assert_eq!(blob.resource_type, "image");
        assert_eq!(blob.format.as_deref(), Some("png"));
        assert_eq!(blob.bytes, 16);
        // Trailing slash on the base URL must not double up.
        assert!(blob.url.starts_with("http://localhost:8080/blobs/intake/"));

        let (folder, name) = blob.public_id.split_once('/').unwrap();
        let data = store.read_blob(folder, name).await.unwrap();
        assert_eq!(data, b"screenshot-bytes".to_vec());
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _dir) = test_store().await;

        let blob = store
            .upload(Bytes::from_static(b"delete-me"), "log.txt", None, "intake")
            .await
            .unwrap();

        store.delete(&blob.public_id).await.unwrap();

        let (folder, name) = blob.public_id.split_once('/').unwrap();
        assert!(store.read_blob(folder, name).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_missing_blob() {
        let (store, _dir) = test_store().await;
        let result = store.delete("intake/does-not-exist.png").await;
        assert!(matches!(result, Err(BlobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (store, _dir) = test_store().await;

        assert!(store
            .upload(Bytes::from_static(b"x"), "evil.png", None, "../escape")
            .await
            .is_err());
        assert!(store.read_blob("..", "passwd").await.is_err());
        assert!(store.read_blob("intake", "../../passwd").await.is_err());
        assert!(store.delete("intake/..").await.is_err());
    }

    #[tokio::test]
    async fn test_name_without_extension() {
        let (store, _dir) = test_store().await;

        let blob = store
            .upload(Bytes::from_static(b"raw-data"), "Makefile", None, "intake")
            .await
            .unwrap();

        assert_eq!(blob.format, None);
        assert_eq!(blob.resource_type, "raw");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(Some("image/png"), None), "image");
        assert_eq!(classify(Some("application/pdf"), Some("pdf")), "raw");
        assert_eq!(classify(None, Some("jpeg")), "image");
        assert_eq!(classify(None, None), "raw");
    }
}
