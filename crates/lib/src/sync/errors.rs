//! Error types for the device-sync module.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SyncError {
    /// A replication wait exhausted its bound before the condition held.
    #[error("Replication incomplete: {what} not available after {attempts} attempts")]
    ReplicationIncomplete { what: String, attempts: u32 },

    /// The caller cancelled the flow through its cancellation token.
    #[error("Sync cancelled")]
    Cancelled,

    /// The recovered vault payload cannot drive a device bootstrap.
    #[error("Invalid vault payload: {reason}")]
    InvalidVaultPayload { reason: String },
}

impl SyncError {
    /// Check if this error indicates replication never completed.
    pub fn is_replication_incomplete(&self) -> bool {
        matches!(self, SyncError::ReplicationIncomplete { .. })
    }

    /// Check if this error indicates caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}
