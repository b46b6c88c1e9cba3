//! Drive collaborator interface
//!
//! The drive is the replicated, encrypted document/file store holding the
//! account's collections and files. The core consumes it through the traits
//! here; `local` provides an in-process implementation whose handles of the
//! same drive key replicate to each other, used by the CLI daemon and the
//! test suite.

pub mod errors;
pub mod local;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

pub use errors::DriveError;
pub use local::{LocalDrive, LocalDriveProvider};

use crate::Result;

/// Events emitted by an open drive handle.
#[derive(Clone, Debug)]
pub enum DriveEvent {
    /// Peer set or replication state changed.
    NetworkUpdated,
    /// A collection received an insert/update/remove.
    CollectionUpdate { collection: String },
    /// A file landed in the local file namespace.
    FileAdded { path: String },
}

/// Options for writing a file into the drive namespace.
#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    /// The bytes are already ciphertext; the drive layer must not seal them
    /// again.
    pub encrypted: bool,

    /// Content-store identifier recorded in the companion file record.
    pub content_id: Option<String>,
}

/// Metadata record kept per file in the drive namespace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileMeta {
    pub path: String,
    pub encrypted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    pub updated_at: String,
}

/// A record-oriented collection within a drive.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Insert a document, returning it as stored.
    async fn insert(&self, doc: Value) -> Result<Value>;

    /// Find all documents matching the query (equality on each query field;
    /// `{}` matches everything).
    async fn find(&self, query: &Value) -> Result<Vec<Value>>;

    /// Find the first document matching the query.
    async fn find_one(&self, query: &Value) -> Result<Option<Value>>;

    /// Merge `changes` into every matching document, returning the count.
    async fn update(&self, query: &Value, changes: &Value) -> Result<u64>;

    /// Remove matching documents, returning the count.
    async fn remove(&self, query: &Value) -> Result<u64>;
}

impl std::fmt::Debug for dyn Drive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("<dyn Drive>")
    }
}

/// An open handle on a replicated drive.
#[async_trait]
pub trait Drive: Send + Sync {
    /// Resolve once the drive is ready for reads and writes.
    async fn ready(&self) -> Result<()>;

    /// Close the handle. Further operations fail with `DriveError::Closed`.
    async fn close(&self) -> Result<()>;

    /// Access a named collection.
    fn collection(&self, name: &str) -> Result<Arc<dyn Collection>>;

    /// Write a file into the drive namespace, updating its file record.
    async fn write_file(&self, path: &str, bytes: &[u8], opts: WriteOptions) -> Result<FileMeta>;

    /// Read a file from the drive namespace.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Subscribe to drive events.
    fn subscribe(&self) -> broadcast::Receiver<DriveEvent>;

    /// Root directory of this handle's local file mirror. Raw-path reads of
    /// the vault/recovery files go through here, not through `read_file`,
    /// because those files must be readable before the drive key is known.
    fn dir(&self) -> &Path;
}

/// Options for opening a drive.
#[derive(Clone, Debug)]
pub struct DriveOpenOptions {
    /// Local directory backing this handle's file mirror.
    pub dir: PathBuf,

    /// The drive's syncing/discovery key.
    pub drive_key: String,

    /// Symmetric encryption key (hex). `None` opens without verifying;
    /// scratch replicas read raw ciphertext files and never decrypt records.
    pub encryption_key: Option<String>,

    /// Whether this handle announces its presence and serves peers.
    pub broadcast: bool,

    /// Whether this handle may write.
    pub read_only: bool,
}

impl DriveOpenOptions {
    /// Options for a full read-write broadcasting participant.
    pub fn participant(dir: PathBuf, drive_key: &str, encryption_key: &str) -> Self {
        Self {
            dir,
            drive_key: drive_key.to_string(),
            encryption_key: Some(encryption_key.to_string()),
            broadcast: true,
            read_only: false,
        }
    }

    /// Options for a read-only, non-broadcasting scratch replica.
    pub fn scratch_replica(dir: PathBuf, drive_key: &str) -> Self {
        Self {
            dir,
            drive_key: drive_key.to_string(),
            encryption_key: None,
            broadcast: false,
            read_only: true,
        }
    }
}

/// Opens drive handles.
#[async_trait]
pub trait DriveProvider: Send + Sync {
    async fn open(&self, opts: DriveOpenOptions) -> Result<Arc<dyn Drive>>;
}

/// Equality match of every field in `query` against `doc`. An empty object
/// matches every document.
pub(crate) fn matches_query(doc: &Value, query: &Value) -> bool {
    match query.as_object() {
        Some(fields) => fields
            .iter()
            .all(|(key, expected)| doc.get(key) == Some(expected)),
        None => false,
    }
}
