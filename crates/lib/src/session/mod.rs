//! Authenticated session context
//!
//! A session context is created at login/sync start and passed by reference
//! into each component, one context per authenticated account per process,
//! no ambient global.

pub mod events;

use std::path::PathBuf;
use std::sync::Arc;

pub use events::{ErrorReport, EventSink, SessionEvent};

use crate::{
    Result,
    account::{AccountIdentity, AuthClaims, DeviceInfo},
    constants::VAULT_SEEN_FILE,
    drive::Drive,
    vault::VaultStore,
};

/// Filesystem layout of one account's local data.
#[derive(Clone, Debug)]
pub struct SessionPaths {
    root: PathBuf,
    email: String,
}

impl SessionPaths {
    pub fn new(root: impl Into<PathBuf>, email: &str) -> Self {
        Self {
            root: root.into(),
            email: email.to_string(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Local account directory.
    pub fn account_dir(&self) -> PathBuf {
        self.root.join(&self.email)
    }

    /// The drive's local file-mirror directory.
    pub fn drive_dir(&self) -> PathBuf {
        self.account_dir().join("drive")
    }

    /// Working area for the scratch replica during device sync.
    pub fn scratch_dir(&self) -> PathBuf {
        self.account_dir().join("scratch")
    }

    /// Flag file marking that this device has seen the vault after a fresh
    /// device sync.
    pub fn vault_seen_path(&self) -> PathBuf {
        self.account_dir().join(VAULT_SEEN_FILE)
    }
}

/// An opened, decrypted account session.
///
/// Returned by the login flow on success; everything downstream (mailbox
/// CRUD, contact search) layers on top of this.
pub struct SessionContext {
    pub account: AccountIdentity,
    pub device: DeviceInfo,
    pub drive: Arc<dyn Drive>,
    pub paths: SessionPaths,
    pub store: VaultStore,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("account", &self.account)
            .field("device", &self.device)
            .field("drive", &"<dyn Drive>")
            .field("paths", &self.paths)
            .field("store", &self.store)
            .finish()
    }
}

impl SessionContext {
    /// Derive fresh auth claims for the account service.
    ///
    /// Recomputed per request and signed with the device signing key; never
    /// persisted.
    pub fn auth_claims(&self) -> Result<AuthClaims> {
        AuthClaims::derive(&self.account, &self.device)
    }

    /// Close the session's drive handle.
    pub async fn close(&self) -> Result<()> {
        self.drive.close().await
    }
}
