//! Encrypted secret-file storage
//!
//! Reads and writes the two account secret files (vault, recovery) and the
//! per-device device-info file. The vault/recovery files are bootstrap
//! artifacts read directly by file path, not as drive-collection records,
//! because the drive cannot be opened until the key they contain has been
//! recovered.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use super::{cipher, errors::VaultError};
use crate::{
    Result,
    account::DeviceInfo,
    constants::{DEVICE_INFO_FILE, RECOVERY_PATH, VAULT_PATH},
    content::ContentStore,
    drive::{Drive, WriteOptions},
};

/// Which of the two secret files an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VaultKind {
    /// Sealed under the master password; holds the drive encryption key.
    Vault,
    /// Sealed under the mnemonic; holds the master password.
    Recovery,
}

impl VaultKind {
    /// Drive-relative path of this file.
    pub fn drive_path(&self) -> &'static str {
        match self {
            VaultKind::Vault => VAULT_PATH,
            VaultKind::Recovery => RECOVERY_PATH,
        }
    }

    /// Bare file name within a drive directory.
    pub fn file_name(&self) -> &'static str {
        self.drive_path().trim_start_matches('/')
    }
}

/// Store for the encrypted vault, recovery, and device-info files of one
/// account.
#[derive(Debug)]
pub struct VaultStore {
    /// Local account directory; device info lives here, outside the
    /// replicated namespace.
    account_dir: PathBuf,

    /// The drive's local file-mirror directory; vault/recovery raw reads go
    /// through here.
    drive_dir: PathBuf,
}

impl VaultStore {
    pub fn new(account_dir: impl Into<PathBuf>, drive_dir: impl Into<PathBuf>) -> Self {
        Self {
            account_dir: account_dir.into(),
            drive_dir: drive_dir.into(),
        }
    }

    fn device_info_path(&self) -> PathBuf {
        self.account_dir.join(DEVICE_INFO_FILE)
    }

    /// Encrypt and write the device-info file.
    ///
    /// The file lives at a fixed local path outside the replicated file
    /// namespace, so device identity never automatically propagates to other
    /// devices.
    pub async fn set_device_info(&self, info: &DeviceInfo, password: &str) -> Result<()> {
        let plaintext = serde_json::to_vec(info)?;
        let ciphertext = cipher::encrypt(&plaintext, password)?;

        tokio::fs::create_dir_all(&self.account_dir).await?;
        tokio::fs::write(self.device_info_path(), ciphertext).await?;

        debug!(device_id = %info.device_id, "Wrote device info");
        Ok(())
    }

    /// Read and decrypt the device-info file.
    ///
    /// Returns `None` when the file does not exist (first run on this
    /// device); raises `VaultError::Decryption` on authentication failure.
    pub async fn get_device_info(&self, password: &str) -> Result<Option<DeviceInfo>> {
        let ciphertext = match tokio::fs::read(self.device_info_path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let plaintext = cipher::decrypt(&ciphertext, password)?;
        let info = serde_json::from_slice(&plaintext)?;
        Ok(Some(info))
    }

    /// Encrypt a payload and write it as one of the two secret files.
    ///
    /// The ciphertext goes to (a) the content store, whose returned upload
    /// identifier this returns, and (b) the drive file namespace at the
    /// fixed path, marked already-encrypted so the drive layer does not seal
    /// it a second time.
    pub async fn set_vault(
        &self,
        drive: &dyn Drive,
        content: &dyn ContentStore,
        password: &str,
        kind: VaultKind,
        payload: &Value,
    ) -> Result<String> {
        let plaintext = serde_json::to_vec(payload)?;
        let ciphertext = cipher::encrypt(&plaintext, password)?;

        let upload_id = content.add(&ciphertext).await?;
        let status = content.status(&upload_id).await?;

        drive
            .write_file(
                kind.drive_path(),
                &ciphertext,
                WriteOptions {
                    encrypted: true,
                    content_id: status.cid,
                },
            )
            .await?;

        debug!(kind = ?kind, "Wrote secret file");
        Ok(upload_id)
    }

    /// Read and decrypt one of the two secret files.
    ///
    /// Reads raw bytes from `custom_dir` when supplied (used when reading
    /// from a not-yet-adopted peer replica during device sync), otherwise
    /// from the default drive directory. Raises `VaultError::NotFound` when
    /// the file is absent, `VaultError::Decryption` when the password is
    /// wrong or the blob is corrupt.
    pub async fn get_vault(
        &self,
        password: &str,
        kind: VaultKind,
        custom_dir: Option<&Path>,
    ) -> Result<Value> {
        let dir = custom_dir.unwrap_or(&self.drive_dir);
        let path = dir.join(kind.file_name());

        let ciphertext = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(VaultError::NotFound { path }.into());
            }
            Err(e) => return Err(e.into()),
        };

        let plaintext = cipher::decrypt(&ciphertext, password)?;
        let payload = serde_json::from_slice(&plaintext)?;
        Ok(payload)
    }
}
