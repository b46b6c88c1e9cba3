//! Error types for the content-store module.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ContentError {
    /// Upload identifier is unknown.
    #[error("Upload not found: {upload_id}")]
    UploadNotFound { upload_id: String },

    /// Content identifier is unknown.
    #[error("Blob not found: {cid}")]
    BlobNotFound { cid: String },

    /// An upload finished with an error.
    #[error("Upload failed: {reason}")]
    UploadFailed { reason: String },
}

impl ContentError {
    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ContentError::UploadNotFound { .. } | ContentError::BlobNotFound { .. }
        )
    }
}
