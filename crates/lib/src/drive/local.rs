//! Local in-process drive implementation
//!
//! Handles opened with the same drive key share one backing state; a write
//! through any handle is mirrored into every open handle's root directory,
//! which is how replication between devices of one account is modeled inside
//! a single process. Collections live in shared memory; the file namespace
//! additionally lands on disk so raw-path reads of the vault/recovery files
//! work before the drive key is known.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;
use tracing::debug;

use super::{
    Collection, Drive, DriveError, DriveEvent, DriveOpenOptions, DriveProvider, FileMeta,
    WriteOptions, matches_query,
};
use crate::{Result, constants::FILE_COLLECTION};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Shared state of one logical drive, keyed by drive key in the provider.
struct SharedDrive {
    /// Fingerprint of the encryption key, set on the first keyed open.
    key_fingerprint: Mutex<Option<String>>,
    collections: Mutex<HashMap<String, Vec<Value>>>,
    files: Mutex<HashMap<String, (Vec<u8>, FileMeta)>>,
    /// Root directories of open handles, mirror targets for file writes.
    mirrors: Mutex<HashMap<u64, PathBuf>>,
    events: broadcast::Sender<DriveEvent>,
    next_handle: AtomicU64,
}

impl SharedDrive {
    fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            key_fingerprint: Mutex::new(None),
            collections: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            mirrors: Mutex::new(HashMap::new()),
            events,
            next_handle: AtomicU64::new(0),
        })
    }

    fn emit(&self, event: DriveEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Opens `LocalDrive` handles, sharing state between handles of the same
/// drive key.
#[derive(Default)]
pub struct LocalDriveProvider {
    drives: Mutex<HashMap<String, Arc<SharedDrive>>>,
}

impl LocalDriveProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn shared_for(&self, drive_key: &str) -> Arc<SharedDrive> {
        let mut drives = self.drives.lock().expect("drive registry poisoned");
        drives
            .entry(drive_key.to_string())
            .or_insert_with(SharedDrive::new)
            .clone()
    }
}

#[async_trait]
impl DriveProvider for LocalDriveProvider {
    async fn open(&self, opts: DriveOpenOptions) -> Result<Arc<dyn Drive>> {
        tokio::fs::create_dir_all(&opts.dir).await?;

        let shared = self.shared_for(&opts.drive_key);

        if let Some(key) = &opts.encryption_key {
            let fingerprint = hex::encode(Sha256::digest(key.as_bytes()));
            let mut stored = shared.key_fingerprint.lock().expect("fingerprint poisoned");
            match stored.as_ref() {
                None => *stored = Some(fingerprint),
                Some(existing) if *existing != fingerprint => {
                    return Err(DriveError::EncryptionKeyMismatch.into());
                }
                Some(_) => {}
            }
        }

        let handle_id = shared.next_handle.fetch_add(1, Ordering::SeqCst);
        shared
            .mirrors
            .lock()
            .expect("mirrors poisoned")
            .insert(handle_id, opts.dir.clone());

        // Replicate the existing file namespace into this handle's directory
        let existing: Vec<(String, Vec<u8>)> = {
            let files = shared.files.lock().expect("files poisoned");
            files
                .iter()
                .map(|(path, (bytes, _))| (path.clone(), bytes.clone()))
                .collect()
        };
        for (path, bytes) in existing {
            write_mirror(&opts.dir, &path, &bytes).await?;
        }

        debug!(
            drive_key = %opts.drive_key,
            dir = %opts.dir.display(),
            read_only = opts.read_only,
            broadcast = opts.broadcast,
            "Opened local drive handle"
        );
        shared.emit(DriveEvent::NetworkUpdated);

        Ok(Arc::new(LocalDrive {
            shared,
            handle_id,
            dir: opts.dir,
            read_only: opts.read_only,
            closed: AtomicBool::new(false),
        }))
    }
}

/// One open handle of a local drive.
pub struct LocalDrive {
    shared: Arc<SharedDrive>,
    handle_id: u64,
    dir: PathBuf,
    read_only: bool,
    closed: AtomicBool,
}

impl LocalDrive {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriveError::Closed.into());
        }
        Ok(())
    }
}

#[async_trait]
impl Drive for LocalDrive {
    async fn ready(&self) -> Result<()> {
        // Local handles are ready as soon as they are open
        self.ensure_open()
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared
            .mirrors
            .lock()
            .expect("mirrors poisoned")
            .remove(&self.handle_id);
        self.shared.emit(DriveEvent::NetworkUpdated);
        Ok(())
    }

    fn collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        self.ensure_open()?;
        Ok(Arc::new(LocalCollection {
            shared: self.shared.clone(),
            name: name.to_string(),
            read_only: self.read_only,
        }))
    }

    async fn write_file(&self, path: &str, bytes: &[u8], opts: WriteOptions) -> Result<FileMeta> {
        self.ensure_open()?;
        if self.read_only {
            return Err(DriveError::ReadOnly.into());
        }

        let meta = FileMeta {
            path: path.to_string(),
            encrypted: opts.encrypted,
            content_id: opts.content_id,
            deleted: false,
            updated_at: chrono::Utc::now().to_rfc3339(),
        };

        self.shared
            .files
            .lock()
            .expect("files poisoned")
            .insert(path.to_string(), (bytes.to_vec(), meta.clone()));

        // Upsert the companion file record
        {
            let mut collections = self.shared.collections.lock().expect("collections poisoned");
            let records = collections.entry(FILE_COLLECTION.to_string()).or_default();
            records.retain(|r| r.get("path").and_then(Value::as_str) != Some(path));
            records.push(serde_json::to_value(&meta)?);
        }

        let mirrors: Vec<PathBuf> = {
            let mirrors = self.shared.mirrors.lock().expect("mirrors poisoned");
            mirrors.values().cloned().collect()
        };
        for dir in mirrors {
            write_mirror(&dir, path, bytes).await?;
        }

        self.shared.emit(DriveEvent::FileAdded {
            path: path.to_string(),
        });
        self.shared.emit(DriveEvent::CollectionUpdate {
            collection: FILE_COLLECTION.to_string(),
        });

        Ok(meta)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let files = self.shared.files.lock().expect("files poisoned");
        files
            .get(path)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| {
                DriveError::FileNotFound {
                    path: path.to_string(),
                }
                .into()
            })
    }

    fn subscribe(&self) -> broadcast::Receiver<DriveEvent> {
        self.shared.events.subscribe()
    }

    fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Collection view over the shared drive state.
struct LocalCollection {
    shared: Arc<SharedDrive>,
    name: String,
    read_only: bool,
}

impl LocalCollection {
    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(DriveError::ReadOnly.into());
        }
        Ok(())
    }

    fn emit_update(&self) {
        self.shared.emit(DriveEvent::CollectionUpdate {
            collection: self.name.clone(),
        });
    }
}

#[async_trait]
impl Collection for LocalCollection {
    async fn insert(&self, mut doc: Value) -> Result<Value> {
        self.ensure_writable()?;

        if let Some(obj) = doc.as_object_mut()
            && !obj.contains_key("_id")
        {
            obj.insert(
                "_id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }

        {
            let mut collections = self.shared.collections.lock().expect("collections poisoned");
            collections
                .entry(self.name.clone())
                .or_default()
                .push(doc.clone());
        }

        self.emit_update();
        Ok(doc)
    }

    async fn find(&self, query: &Value) -> Result<Vec<Value>> {
        let collections = self.shared.collections.lock().expect("collections poisoned");
        Ok(collections
            .get(&self.name)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| matches_query(r, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find_one(&self, query: &Value) -> Result<Option<Value>> {
        Ok(self.find(query).await?.into_iter().next())
    }

    async fn update(&self, query: &Value, changes: &Value) -> Result<u64> {
        self.ensure_writable()?;

        let changed_fields = changes
            .as_object()
            .ok_or_else(|| DriveError::InvalidRecord {
                reason: "Update changes must be an object".to_string(),
            })?
            .clone();

        let count = {
            let mut collections = self.shared.collections.lock().expect("collections poisoned");
            let records = collections.entry(self.name.clone()).or_default();
            let mut count = 0u64;
            for record in records.iter_mut() {
                if matches_query(record, query)
                    && let Some(obj) = record.as_object_mut()
                {
                    for (key, value) in &changed_fields {
                        obj.insert(key.clone(), value.clone());
                    }
                    count += 1;
                }
            }
            count
        };

        if count > 0 {
            self.emit_update();
        }
        Ok(count)
    }

    async fn remove(&self, query: &Value) -> Result<u64> {
        self.ensure_writable()?;

        let count = {
            let mut collections = self.shared.collections.lock().expect("collections poisoned");
            let records = collections.entry(self.name.clone()).or_default();
            let before = records.len();
            records.retain(|r| !matches_query(r, query));
            (before - records.len()) as u64
        };

        if count > 0 {
            self.emit_update();
        }
        Ok(count)
    }
}

/// Write a namespace file under a handle directory, creating parents.
async fn write_mirror(dir: &Path, path: &str, bytes: &[u8]) -> Result<()> {
    let target = dir.join(path.trim_start_matches('/'));
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&target, bytes).await?;
    Ok(())
}
