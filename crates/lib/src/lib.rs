//!
//! Covault: the account-security core of a private mail and drive client.
//!
//! This library protects a user's account identity (signing keys, a symmetric
//! drive-encryption key, and a recovery phrase) behind a memorized password,
//! recovers it from a mnemonic passphrase when the password is lost, and
//! bootstraps it onto additional physical devices without ever moving raw key
//! material in the clear.
//!
//! ## Core Concepts
//!
//! * **VaultCipher (`vault::cipher`)**: pure password-based key derivation and
//!   authenticated encryption of small JSON payloads.
//! * **VaultStore (`vault::VaultStore`)**: reads/writes the two encrypted
//!   secret files (vault, recovery) and the per-device encrypted device-info
//!   file.
//! * **LoginStateMachine (`login::LoginStateMachine`)**: orchestrates account
//!   login: decrypt the vault, migrate legacy schemas, open the Drive,
//!   reconcile device registration, and refresh auth claims.
//! * **DeviceSyncOrchestrator (`sync::DeviceSyncOrchestrator`)**: bootstraps a
//!   brand-new device from an existing account using a short-lived sync code.
//! * **Collaborators (`drive`, `content`, `remote`)**: the replicated
//!   encrypted document store, the content-addressable blob store, and the
//!   remote identity service, consumed through traits. Local in-process
//!   implementations are provided for single-process operation and tests.

pub mod account;
pub mod cancel;
pub mod constants;
pub mod content;
pub mod drive;
pub mod login;
pub mod remote;
pub mod session;
pub mod sync;
pub mod vault;

pub use account::AccountManager;
pub use session::SessionContext;

/// Result type used throughout the Covault library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Covault library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured vault/cipher errors from the vault module
    #[error(transparent)]
    Vault(vault::VaultError),

    /// Structured login errors from the login module
    #[error(transparent)]
    Login(login::LoginError),

    /// Structured device-sync errors from the sync module
    #[error(transparent)]
    Sync(sync::SyncError),

    /// Structured drive errors from the drive module
    #[error(transparent)]
    Drive(drive::DriveError),

    /// Structured content-store errors from the content module
    #[error(transparent)]
    Content(content::ContentError),

    /// Structured remote-service errors from the remote module
    #[error(transparent)]
    Remote(remote::RemoteError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Vault(_) => "vault",
            Error::Login(_) => "login",
            Error::Sync(_) => "sync",
            Error::Drive(_) => "drive",
            Error::Content(_) => "content",
            Error::Remote(_) => "remote",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates the vault/recovery file was absent.
    ///
    /// This is the single failure the login flow tolerates.
    pub fn is_vault_not_found(&self) -> bool {
        matches!(self, Error::Vault(e) if e.is_not_found())
    }

    /// Check if this error is an authenticated-decryption failure,
    /// which in practice means a wrong password or mnemonic.
    pub fn is_decryption_error(&self) -> bool {
        matches!(self, Error::Vault(e) if e.is_decryption_error())
    }

    /// Check if this error is network/connectivity related.
    pub fn is_network_error(&self) -> bool {
        match self {
            Error::Drive(e) => e.is_network_error(),
            Error::Remote(e) => e.is_network_error(),
            _ => false,
        }
    }

    /// Check if this error is a legacy schema migration failure.
    pub fn is_migration_error(&self) -> bool {
        matches!(self, Error::Login(e) if e.is_migration_error())
    }

    /// Check if this error indicates replication never completed.
    pub fn is_replication_incomplete(&self) -> bool {
        matches!(self, Error::Sync(e) if e.is_replication_incomplete())
    }

    /// Check if this error indicates the flow was cancelled by the caller.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Sync(e) if e.is_cancelled())
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Vault(e) => e.is_not_found(),
            Error::Drive(e) => e.is_not_found(),
            Error::Content(e) => e.is_not_found(),
            Error::Remote(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<vault::VaultError> for Error {
    fn from(err: vault::VaultError) -> Self {
        Error::Vault(err)
    }
}

impl From<login::LoginError> for Error {
    fn from(err: login::LoginError) -> Self {
        Error::Login(err)
    }
}

impl From<sync::SyncError> for Error {
    fn from(err: sync::SyncError) -> Self {
        Error::Sync(err)
    }
}

impl From<drive::DriveError> for Error {
    fn from(err: drive::DriveError) -> Self {
        Error::Drive(err)
    }
}

impl From<content::ContentError> for Error {
    fn from(err: content::ContentError) -> Self {
        Error::Content(err)
    }
}

impl From<remote::RemoteError> for Error {
    fn from(err: remote::RemoteError) -> Self {
        Error::Remote(err)
    }
}
