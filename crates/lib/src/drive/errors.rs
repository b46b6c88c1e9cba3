//! Error types for the drive module.

use thiserror::Error;

/// Errors that can occur talking to a drive.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DriveError {
    /// File not found in the drive namespace.
    #[error("Drive file not found: {path}")]
    FileNotFound { path: String },

    /// Write attempted on a read-only replica.
    #[error("Drive is read-only")]
    ReadOnly,

    /// Operation attempted on a closed drive handle.
    #[error("Drive is closed")]
    Closed,

    /// Supplied encryption key does not open this drive.
    #[error("Drive encryption key mismatch")]
    EncryptionKeyMismatch,

    /// Network/replication communication error.
    #[error("Drive network error: {0}")]
    Network(String),

    /// Malformed stored document.
    #[error("Invalid drive record: {reason}")]
    InvalidRecord { reason: String },
}

impl DriveError {
    /// Check if this is a not found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriveError::FileNotFound { .. })
    }

    /// Check if this is a network/replication error.
    pub fn is_network_error(&self) -> bool {
        matches!(self, DriveError::Network(_))
    }

    /// Check if this is a handle lifecycle error.
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(self, DriveError::ReadOnly | DriveError::Closed)
    }
}
