//! Full-device resync
//!
//! After a fresh device sync the new device holds replicated records but no
//! local search state. The resync pass walks the non-deleted file records,
//! rebuilds the full-text index entry of every email file, and rebuilds the
//! contact index. Index maintenance itself belongs to the indexing
//! collaborator; this module only drives it.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::{
    Result,
    constants::{EMAIL_PATH_PREFIX, FILE_COLLECTION},
    drive::{Drive, FileMeta},
};

/// Receiver of the resync passes.
#[async_trait]
pub trait ResyncIndexer: Send + Sync {
    /// Rebuild the full-text entry for one email file.
    async fn index_email(&self, file: &FileMeta) -> Result<()>;

    /// Rebuild the contact full-text index.
    async fn rebuild_contacts(&self) -> Result<()>;
}

/// Indexer that does nothing, for callers without search.
pub struct NullIndexer;

#[async_trait]
impl ResyncIndexer for NullIndexer {
    async fn index_email(&self, _file: &FileMeta) -> Result<()> {
        Ok(())
    }

    async fn rebuild_contacts(&self) -> Result<()> {
        Ok(())
    }
}

/// Outcome of both passes.
#[derive(Clone, Copy, Debug)]
pub struct ResyncReport {
    pub emails: bool,
    pub contacts: bool,
}

/// Run both resync passes to completion.
pub async fn full_device_resync(
    drive: &dyn Drive,
    indexer: &dyn ResyncIndexer,
) -> Result<ResyncReport> {
    let files = drive.collection(FILE_COLLECTION)?;
    let records = files.find(&json!({"deleted": false})).await?;

    let mut indexed = 0usize;
    for record in records {
        let meta: FileMeta = serde_json::from_value(record)?;
        if meta.path.starts_with(EMAIL_PATH_PREFIX) {
            indexer.index_email(&meta).await?;
            indexed += 1;
        }
    }

    indexer.rebuild_contacts().await?;

    info!(emails = indexed, "Full device resync finished");
    Ok(ResyncReport {
        emails: true,
        contacts: true,
    })
}
