//! Account manager facade
//!
//! Drives the UI-originated flows: create account, login, reset password,
//! issue/consume sync codes, and local account removal. One manager per
//! process; every flow builds its own explicit session context, with no
//! ambient global session.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{
    keys,
    types::{AccountIdentity, AuthClaims, DeviceInfo, DeviceType, RecoveryPayload, VaultPayload},
};
use crate::{
    Result,
    cancel::CancellationToken,
    constants::{ACCOUNT_COLLECTION, DRIVE_VERSION, FOLDER_COLLECTION, MAILBOX_COLLECTION},
    content::ContentStore,
    drive::{DriveOpenOptions, DriveProvider},
    login::LoginStateMachine,
    remote::AccountService,
    session::{EventSink, SessionContext, SessionEvent, SessionPaths},
    sync::DeviceSyncOrchestrator,
    vault::{VaultError, VaultKind, VaultStore},
};

/// Default folders seeded into a fresh account.
const DEFAULT_FOLDERS: [&str; 4] = ["Inbox", "Sent", "Drafts", "Trash"];

pub struct AccountManager {
    root: PathBuf,
    drives: Arc<dyn DriveProvider>,
    content: Arc<dyn ContentStore>,
    remote: Arc<dyn AccountService>,
    sink: EventSink,
}

impl AccountManager {
    pub fn new(
        root: impl Into<PathBuf>,
        drives: Arc<dyn DriveProvider>,
        content: Arc<dyn ContentStore>,
        remote: Arc<dyn AccountService>,
        sink: EventSink,
    ) -> Self {
        Self {
            root: root.into(),
            drives,
            content,
            remote,
            sink,
        }
    }

    /// Filesystem layout for one account.
    pub fn paths(&self, email: &str) -> SessionPaths {
        SessionPaths::new(&self.root, email)
    }

    /// Create a fresh account: generate its identity, register it, open its
    /// drive, and write the account document, vault, recovery, and
    /// device-info files.
    pub async fn create_account(
        &self,
        email: &str,
        password: &str,
        device_type: DeviceType,
    ) -> Result<SessionContext> {
        let paths = self.paths(email);
        let now = chrono::Utc::now().to_rfc3339();

        let signing_keypair = keys::generate_signing_keypair();
        let drive_keypair = keys::generate_signing_keypair();
        let account = AccountIdentity {
            uid: Uuid::new_v4().to_string(),
            secret_box_keypair: keys::generate_box_keypair(),
            signing_keypair: Some(signing_keypair.clone()),
            drive_encryption_key: keys::generate_symmetric_key(),
            drive_syncing_public_key: drive_keypair.public,
            mnemonic: keys::generate_mnemonic()?,
            created_at: now.clone(),
            updated_at: now.clone(),
        };

        self.remote
            .register(
                &account.secret_box_keypair.public,
                email,
                &account.drive_syncing_public_key,
            )
            .await?;

        let drive = self
            .drives
            .open(DriveOpenOptions::participant(
                paths.drive_dir(),
                &account.drive_syncing_public_key,
                &account.drive_encryption_key,
            ))
            .await?;
        drive.ready().await?;

        let store = VaultStore::new(paths.account_dir(), paths.drive_dir());
        let onboarded = async {
            drive
                .collection(ACCOUNT_COLLECTION)?
                .insert(serde_json::to_value(&account)?)
                .await?;
            drive
                .collection(MAILBOX_COLLECTION)?
                .insert(json!({"address": email, "created_at": now}))
                .await?;
            let folders = drive.collection(FOLDER_COLLECTION)?;
            for (seq, name) in DEFAULT_FOLDERS.iter().enumerate() {
                folders
                    .insert(json!({"name": name, "seq": seq + 1, "created_at": now}))
                    .await?;
            }

            let vault_payload = VaultPayload {
                drive_encryption_key: account.drive_encryption_key.clone(),
                key_pair: Some(signing_keypair.clone()),
            };
            store
                .set_vault(
                    drive.as_ref(),
                    self.content.as_ref(),
                    password,
                    VaultKind::Vault,
                    &serde_json::to_value(&vault_payload)?,
                )
                .await?;

            let recovery_payload = RecoveryPayload {
                master_pass: password.to_string(),
            };
            store
                .set_vault(
                    drive.as_ref(),
                    self.content.as_ref(),
                    &account.mnemonic,
                    VaultKind::Recovery,
                    &serde_json::to_value(&recovery_payload)?,
                )
                .await?;

            let mut device = DeviceInfo {
                key_pair: signing_keypair.clone(),
                device_id: Uuid::new_v4().to_string(),
                device_type,
                server_sig: None,
                drive_version: Some(DRIVE_VERSION.to_string()),
                drive_syncing_public_key: account.drive_syncing_public_key.clone(),
            };
            let claims = AuthClaims::derive(&account, &device)?;
            device.server_sig = Some(self.remote.register_new_device(&claims).await?);
            store.set_device_info(&device, password).await?;

            Ok::<DeviceInfo, crate::Error>(device)
        }
        .await;

        let device = match onboarded {
            Ok(device) => device,
            Err(e) => {
                let _ = drive.close().await;
                return Err(e);
            }
        };

        info!(uid = %account.uid, email = %email, "Account created");
        self.sink.send(SessionEvent::AccountCreated {
            uid: account.uid.clone(),
        });

        Ok(SessionContext {
            account,
            device,
            drive,
            paths,
            store,
        })
    }

    /// Log an existing account in on this device.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionContext> {
        LoginStateMachine::new(
            self.paths(email),
            self.drives.clone(),
            self.content.clone(),
            self.remote.clone(),
            self.sink.clone(),
        )
        .run(password)
        .await
    }

    /// Recover the master password from the mnemonic recovery phrase.
    pub async fn recover_master_password(&self, email: &str, mnemonic: &str) -> Result<String> {
        let paths = self.paths(email);
        let store = VaultStore::new(paths.account_dir(), paths.drive_dir());

        let value = store.get_vault(mnemonic, VaultKind::Recovery, None).await?;
        let payload: RecoveryPayload = serde_json::from_value(value)?;
        Ok(payload.master_pass.clone())
    }

    /// Re-seal the vault under a new master password, and the recovery file
    /// (now containing the new password) under the unchanged mnemonic.
    ///
    /// The device-info file is re-sealed as well; the old password stops
    /// opening anything.
    pub async fn reset_password(
        &self,
        email: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let paths = self.paths(email);
        let store = VaultStore::new(paths.account_dir(), paths.drive_dir());

        let device = store.get_device_info(old_password).await?.ok_or_else(|| {
            VaultError::NotFound {
                path: paths.account_dir().join(crate::constants::DEVICE_INFO_FILE),
            }
        })?;

        let value = store.get_vault(old_password, VaultKind::Vault, None).await?;
        let payload: VaultPayload = serde_json::from_value(value)?;

        let drive = self
            .drives
            .open(DriveOpenOptions::participant(
                paths.drive_dir(),
                &device.drive_syncing_public_key,
                &payload.drive_encryption_key,
            ))
            .await?;
        drive.ready().await?;

        let resealed = async {
            let account_doc = drive
                .collection(ACCOUNT_COLLECTION)?
                .find_one(&json!({}))
                .await?
                .ok_or(crate::login::LoginError::AccountMissing)?;
            let account: AccountIdentity = serde_json::from_value(account_doc)?;

            store
                .set_vault(
                    drive.as_ref(),
                    self.content.as_ref(),
                    new_password,
                    VaultKind::Vault,
                    &serde_json::to_value(&payload)?,
                )
                .await?;

            let recovery = RecoveryPayload {
                master_pass: new_password.to_string(),
            };
            store
                .set_vault(
                    drive.as_ref(),
                    self.content.as_ref(),
                    &account.mnemonic,
                    VaultKind::Recovery,
                    &serde_json::to_value(&recovery)?,
                )
                .await?;

            store.set_device_info(&device, new_password).await?;
            Ok::<(), crate::Error>(())
        }
        .await;

        let _ = drive.close().await;
        resealed?;

        info!(email = %email, "Master password reset");
        Ok(())
    }

    /// Issue a short-lived sync code authorizing a new device to bootstrap
    /// from this session's account.
    pub async fn create_sync_code(&self, ctx: &SessionContext) -> Result<String> {
        let claims = ctx.auth_claims()?;
        self.remote.create_sync_code(&claims).await
    }

    /// Consume a sync code and bootstrap this device from the peer account.
    pub async fn sync_device(
        &self,
        code: &str,
        password: &str,
        device_type: DeviceType,
    ) -> Result<SessionContext> {
        self.sync_device_with(code, password, device_type, CancellationToken::never())
            .await
    }

    /// `sync_device` observing a caller-held cancellation token.
    pub async fn sync_device_with(
        &self,
        code: &str,
        password: &str,
        device_type: DeviceType,
        token: CancellationToken,
    ) -> Result<SessionContext> {
        let info = self.remote.get_sync_info(code).await?;

        DeviceSyncOrchestrator::new(
            self.paths(&info.email),
            self.drives.clone(),
            self.content.clone(),
            self.remote.clone(),
            self.sink.clone(),
        )
        .with_cancellation(token)
        .run(&info.drive_key, password, device_type)
        .await
    }

    /// Delete this account's local data. The replicated drive on other
    /// devices is untouched.
    pub async fn remove_local_account(&self, email: &str) -> Result<()> {
        let account_dir = self.paths(email).account_dir();
        if tokio::fs::try_exists(&account_dir).await? {
            tokio::fs::remove_dir_all(&account_dir).await?;
        }
        info!(email = %email, "Removed local account data");
        Ok(())
    }
}
