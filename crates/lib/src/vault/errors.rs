//! Error types for the vault system
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum VaultError {
    /// Authenticated decryption failed. The cipher cannot distinguish a wrong
    /// password from corrupted data; this single signal covers both.
    #[error("Unable to decrypt message.")]
    Decryption,

    /// Sealing a payload failed at the AEAD layer. Not expected in normal
    /// operation.
    #[error("Encryption failed: {reason}")]
    Encryption { reason: String },

    /// An expected secret file is absent.
    #[error("Vault file not found: {path}")]
    NotFound { path: PathBuf },

    /// Password-to-seed derivation failed.
    #[error("Key derivation failed: {reason}")]
    KeyDerivation { reason: String },

    /// A decrypted payload did not contain the expected JSON shape.
    #[error("Malformed vault payload: {reason}")]
    MalformedPayload { reason: String },
}

impl VaultError {
    /// Check if this error indicates the secret file was absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound { .. })
    }

    /// Check if this error is an authentication failure on decrypt.
    pub fn is_decryption_error(&self) -> bool {
        matches!(self, VaultError::Decryption)
    }
}
