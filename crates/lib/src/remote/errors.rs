//! Error types for the remote account-service module.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemoteError {
    /// Connectivity failure reaching the account service.
    #[error("Account service network error: {0}")]
    Network(String),

    /// The service rejected the request.
    #[error("Account service rejected request: {reason}")]
    Rejected { reason: String },

    /// No account registered under the presented claims.
    #[error("Account not found: {account_key}")]
    AccountNotFound { account_key: String },

    /// Sync code unknown, already consumed, or expired.
    #[error("Invalid sync code")]
    InvalidSyncCode,

    /// Claims signature did not verify.
    #[error("Invalid auth claims: {reason}")]
    InvalidClaims { reason: String },
}

impl RemoteError {
    /// Check if this is a network/connectivity error.
    pub fn is_network_error(&self) -> bool {
        matches!(self, RemoteError::Network(_))
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RemoteError::AccountNotFound { .. } | RemoteError::InvalidSyncCode
        )
    }
}
