//! All-or-nothing attachment batch uploads.
//!
//! Files for one message are uploaded concurrently.  If any of them fails,
//! the ones that already landed are deleted again and the whole batch is
//! reported as failed, so a ticket never references half a batch.

use std::sync::Arc;

use bytes::Bytes;
use futures::future;
use thiserror::Error;
use tracing::{debug, warn};

use helpline_shared::Attachment;

use crate::blob_store::{BlobError, BlobStore};

/// One file lifted out of a multipart request.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Attachment '{0}' is empty")]
    EmptyFile(String),

    #[error("Too many attachments: {count} (max {max})")]
    TooMany { count: usize, max: usize },

    #[error("Attachment '{filename}' is too large: {size} bytes (max {max})")]
    TooLarge {
        filename: String,
        size: usize,
        max: usize,
    },

    #[error("Upload of '{filename}' failed: {reason}")]
    Failed { filename: String, reason: String },
}

/// Uploads attachment batches against a [`BlobStore`].
pub struct AttachmentUploader {
    store: Arc<dyn BlobStore>,
    max_file_size: usize,
    max_files: usize,
}

impl AttachmentUploader {
    pub fn new(store: Arc<dyn BlobStore>, max_file_size: usize, max_files: usize) -> Self {
        Self {
            store,
            max_file_size,
            max_files,
        }
    }

    /// Upload a batch of files into one folder.
    ///
    /// Either every file is stored and its [`Attachment`] metadata returned,
    /// or none remain stored and the first failure is returned.  An empty
    /// batch is fine and uploads nothing.
    pub async fn upload_batch(
        &self,
        files: Vec<UploadFile>,
        folder: &str,
    ) -> Result<Vec<Attachment>, UploadError> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        if files.len() > self.max_files {
            return Err(UploadError::TooMany {
                count: files.len(),
                max: self.max_files,
            });
        }
        for file in &files {
            if file.bytes.is_empty() {
                return Err(UploadError::EmptyFile(file.filename.clone()));
            }
            if file.bytes.len() > self.max_file_size {
                return Err(UploadError::TooLarge {
                    filename: file.filename.clone(),
                    size: file.bytes.len(),
                    max: self.max_file_size,
                });
            }
        }

        let uploads = files.into_iter().map(|file| {
            let store = self.store.clone();
            let folder = folder.to_string();
            async move {
                let UploadFile {
                    filename,
                    content_type,
                    bytes,
                } = file;
                match store
                    .upload(bytes, &filename, content_type.as_deref(), &folder)
                    .await
                {
                    Ok(blob) => Ok(Attachment {
                        url: blob.url,
                        public_id: blob.public_id,
                        original_filename: filename,
                        bytes: blob.bytes,
                        resource_type: blob.resource_type,
                        format: blob.format,
                    }),
                    Err(e) => Err((filename, e)),
                }
            }
        });
        let results = future::join_all(uploads).await;

        let mut attachments = Vec::with_capacity(results.len());
        let mut failure: Option<(String, BlobError)> = None;
        for result in results {
            match result {
                Ok(attachment) => attachments.push(attachment),
                Err((filename, e)) => {
                    if failure.is_none() {
                        failure = Some((filename, e));
                    }
                }
            }
        }

        if let Some((filename, reason)) = failure {
            self.rollback(&attachments).await;
            return Err(UploadError::Failed {
                filename,
                reason: reason.to_string(),
            });
        }

        Ok(attachments)
    }

    /// Best-effort compensating deletes for attachments whose message never
    /// made it into the store.  Failures are logged, never propagated.
    pub async fn rollback(&self, attachments: &[Attachment]) {
        for attachment in attachments {
            match self.store.delete(&attachment.public_id).await {
                Ok(()) => debug!(public_id = %attachment.public_id, "Rolled back attachment"),
                Err(e) => warn!(
                    public_id = %attachment.public_id,
                    error = %e,
                    "Failed to roll back attachment"
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::FakeBlobStore;

    fn file(name: &str, data: &'static [u8]) -> UploadFile {
        UploadFile {
            filename: name.to_string(),
            content_type: None,
            bytes: Bytes::from_static(data),
        }
    }

    fn uploader(store: Arc<FakeBlobStore>) -> AttachmentUploader {
        AttachmentUploader::new(store, 1024, 3)
    }

    #[tokio::test]
    async fn test_batch_upload() {
        let store = FakeBlobStore::new();
        let attachments = uploader(store.clone())
            .upload_batch(
                vec![file("a.png", b"aaa"), file("b.txt", b"bb")],
                "ticket-1",
            )
            .await
            .unwrap();

        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].original_filename, "a.png");
        assert_eq!(attachments[0].bytes, 3);
        assert!(attachments[0].public_id.starts_with("ticket-1/"));
        assert_eq!(store.live_blob_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let store = FakeBlobStore::new();
        let attachments = uploader(store.clone())
            .upload_batch(Vec::new(), "ticket-1")
            .await
            .unwrap();
        assert!(attachments.is_empty());
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_rolls_back() {
        let store = FakeBlobStore::new();
        store.fail_for("b.txt");

        let result = uploader(store.clone())
            .upload_batch(
                vec![
                    file("a.png", b"aaa"),
                    file("b.txt", b"bb"),
                    file("c.gif", b"cc"),
                ],
                "ticket-1",
            )
            .await;

        match result {
            Err(UploadError::Failed { filename, .. }) => assert_eq!(filename, "b.txt"),
            other => panic!("expected batch failure, got {:?}", other.map(|a| a.len())),
        }
        // The files that did land were deleted again.
        assert_eq!(store.live_blob_count(), 0);
        assert_eq!(store.delete_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_file_rejected_before_upload() {
        let store = FakeBlobStore::new();
        let result = uploader(store.clone())
            .upload_batch(vec![file("a.png", b"aaa"), file("empty.txt", b"")], "x")
            .await;

        assert!(matches!(result, Err(UploadError::EmptyFile(name)) if name == "empty.txt"));
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_too_many_files_rejected() {
        let store = FakeBlobStore::new();
        let files = vec![
            file("1", b"x"),
            file("2", b"x"),
            file("3", b"x"),
            file("4", b"x"),
        ];
        let result = uploader(store.clone()).upload_batch(files, "x").await;

        assert!(matches!(
            result,
            Err(UploadError::TooMany { count: 4, max: 3 })
        ));
        assert_eq!(store.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_file_rejected() {
        let store = FakeBlobStore::new();
        let big = Bytes::from(vec![0u8; 2048]);
        let result = uploader(store.clone())
            .upload_batch(
                vec![UploadFile {
                    filename: "big.bin".to_string(),
                    content_type: None,
                    bytes: big,
                }],
                "x",
            )
            .await;

        assert!(matches!(result, Err(UploadError::TooLarge { .. })));
        assert_eq!(store.upload_count(), 0);
    }
}
