//! Shared fakes for service-level tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::blob_store::{classify, BlobError, BlobStore, StoredBlob};
use crate::notify::{Mail, Notifier, NotifyError};

/// In-memory blob store with programmable per-file failures.
pub(crate) struct FakeBlobStore {
    stored: Mutex<HashMap<String, u64>>,
    uploads: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
    fail_on: Mutex<HashSet<String>>,
}

impl FakeBlobStore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            stored: Mutex::new(HashMap::new()),
            uploads: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            fail_on: Mutex::new(HashSet::new()),
        })
    }

    /// Make uploads of this filename fail.
    pub(crate) fn fail_for(&self, filename: &str) {
        self.fail_on.lock().unwrap().insert(filename.to_string());
    }

    /// Blobs currently stored (uploaded and not deleted).
    pub(crate) fn live_blob_count(&self) -> usize {
        self.stored.lock().unwrap().len()
    }

    /// Upload attempts that reached the store, failed ones included.
    pub(crate) fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }

    pub(crate) fn delete_count(&self) -> usize {
        self.deletes.lock().unwrap().len()
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn upload(
        &self,
        data: Bytes,
        original_filename: &str,
        content_type: Option<&str>,
        folder: &str,
    ) -> Result<StoredBlob, BlobError> {
        self.uploads
            .lock()
            .unwrap()
            .push(original_filename.to_string());

        if self.fail_on.lock().unwrap().contains(original_filename) {
            return Err(BlobError::Storage("injected failure".to_string()));
        }

        let format = original_filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase());
        let public_id = format!("{}/{}", folder, original_filename);
        self.stored
            .lock()
            .unwrap()
            .insert(public_id.clone(), data.len() as u64);

        Ok(StoredBlob {
            url: format!("fake://{}", public_id),
            public_id,
            resource_type: classify(content_type, format.as_deref()).to_string(),
            format,
            bytes: data.len() as u64,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), BlobError> {
        self.deletes.lock().unwrap().push(public_id.to_string());
        self.stored.lock().unwrap().remove(public_id);
        Ok(())
    }
}

/// Notifier that forwards every mail to an in-test channel.
pub(crate) struct RecordingNotifier {
    tx: mpsc::UnboundedSender<Mail>,
}

pub(crate) fn recording_notifier() -> (Arc<RecordingNotifier>, mpsc::UnboundedReceiver<Mail>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(RecordingNotifier { tx }), rx)
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_mail(&self, mail: &Mail) -> Result<(), NotifyError> {
        // The receiver may be gone when a test only cares about side
        // effects, that is fine.
        let _ = self.tx.send(mail.clone());
        Ok(())
    }
}
