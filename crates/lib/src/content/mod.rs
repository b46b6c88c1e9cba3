//! Content-addressable blob store collaborator
//!
//! Used for durable off-device backup of drive files. The vault/recovery
//! ciphertexts are mirrored here; the returned content identifier is recorded
//! in the companion file record, never inside the ciphertext itself.

pub mod errors;

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub use errors::ContentError;

use crate::Result;

/// Status of an upload previously handed to `add`.
#[derive(Clone, Debug)]
pub struct ContentStatus {
    pub done: bool,
    pub cid: Option<String>,
    pub error: Option<String>,
}

/// Content-addressable blob store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Start storing a blob; returns an upload identifier to poll with
    /// `status`.
    async fn add(&self, bytes: &[u8]) -> Result<String>;

    /// Check an upload; `done` with a `cid` on success.
    async fn status(&self, upload_id: &str) -> Result<ContentStatus>;

    /// Fetch a blob by content identifier.
    async fn get(&self, cid: &str) -> Result<Vec<u8>>;

    /// Delete a blob by content identifier.
    async fn delete(&self, cid: &str) -> Result<()>;
}

/// In-memory content store. Uploads complete synchronously; the content
/// identifier is the SHA-256 of the bytes.
#[derive(Default)]
pub struct MemoryContentStore {
    uploads: Mutex<HashMap<String, String>>,
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn add(&self, bytes: &[u8]) -> Result<String> {
        let cid = hex::encode(Sha256::digest(bytes));
        let upload_id = Uuid::new_v4().to_string();

        self.blobs
            .lock()
            .expect("blobs poisoned")
            .insert(cid.clone(), bytes.to_vec());
        self.uploads
            .lock()
            .expect("uploads poisoned")
            .insert(upload_id.clone(), cid);

        Ok(upload_id)
    }

    async fn status(&self, upload_id: &str) -> Result<ContentStatus> {
        let uploads = self.uploads.lock().expect("uploads poisoned");
        match uploads.get(upload_id) {
            Some(cid) => Ok(ContentStatus {
                done: true,
                cid: Some(cid.clone()),
                error: None,
            }),
            None => Err(ContentError::UploadNotFound {
                upload_id: upload_id.to_string(),
            }
            .into()),
        }
    }

    async fn get(&self, cid: &str) -> Result<Vec<u8>> {
        let blobs = self.blobs.lock().expect("blobs poisoned");
        blobs.get(cid).cloned().ok_or_else(|| {
            ContentError::BlobNotFound {
                cid: cid.to_string(),
            }
            .into()
        })
    }

    async fn delete(&self, cid: &str) -> Result<()> {
        self.blobs.lock().expect("blobs poisoned").remove(cid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_fetch_round_trip() {
        let store = MemoryContentStore::new();

        let upload_id = store.add(b"ciphertext").await.unwrap();
        let status = store.status(&upload_id).await.unwrap();
        assert!(status.done);

        let cid = status.cid.unwrap();
        assert_eq!(store.get(&cid).await.unwrap(), b"ciphertext");
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let store = MemoryContentStore::new();
        let err = store.get("deadbeef").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
