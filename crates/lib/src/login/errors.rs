//! Error types for the login module.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoginError {
    /// A legacy schema upgrade step failed.
    #[error("Migration '{step}' failed: {reason}")]
    Migration { step: String, reason: String },

    /// The drive opened but holds no account document.
    #[error("Account document missing from drive")]
    AccountMissing,

    /// The account document did not deserialize.
    #[error("Malformed account document: {reason}")]
    MalformedAccount { reason: String },
}

impl LoginError {
    /// Check if this is a schema migration failure.
    pub fn is_migration_error(&self) -> bool {
        matches!(self, LoginError::Migration { .. })
    }
}
