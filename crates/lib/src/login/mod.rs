//! Login state machine
//!
//! Brings an account online on this device: decrypt the vault, migrate
//! legacy schemas, open the drive, reconcile device registration, backfill
//! signing keys, and attach change listeners. Each transition emits a
//! progress event on the session sink; the stream terminates with exactly
//! one `LoginComplete` or `LoginFailed`.

pub mod errors;
pub mod migration;

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

pub use errors::LoginError;
pub use migration::{MigrationContext, MigrationRunner, MigrationStep};

use crate::{
    Result,
    account::{AccountIdentity, AuthClaims, DeviceInfo, DeviceType, VaultPayload, keys},
    constants::{ACCOUNT_COLLECTION, DRIVE_VERSION, FILE_COLLECTION, RECOVERY_PATH, VAULT_PATH},
    content::ContentStore,
    drive::{Drive, DriveEvent, DriveOpenOptions, DriveProvider},
    remote::AccountService,
    session::{ErrorReport, EventSink, SessionContext, SessionEvent, SessionPaths},
    sync::resync::{self, NullIndexer, ResyncIndexer},
    vault::{VaultKind, VaultStore},
};

/// States of the login flow, linear with conditional forks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoginState {
    Start,
    DecryptVault,
    MigrateLegacySchema,
    OpenDrive,
    LoadAccountDocument,
    BackfillDeviceInfo,
    RegisterDeviceWithServer,
    EnsureSigningKeys,
    FullDeviceResync,
    MigrateVaultToContentStore,
    AttachChangeListeners,
    Ready,
    Failed,
}

/// Orchestrates account login.
pub struct LoginStateMachine {
    paths: SessionPaths,
    drives: Arc<dyn DriveProvider>,
    content: Arc<dyn ContentStore>,
    remote: Arc<dyn AccountService>,
    sink: EventSink,
    migrations: MigrationRunner,
    indexer: Arc<dyn ResyncIndexer>,
    freshly_synced: bool,
}

impl LoginStateMachine {
    pub fn new(
        paths: SessionPaths,
        drives: Arc<dyn DriveProvider>,
        content: Arc<dyn ContentStore>,
        remote: Arc<dyn AccountService>,
        sink: EventSink,
    ) -> Self {
        Self {
            paths,
            drives,
            content,
            remote,
            sink,
            migrations: MigrationRunner::with_default_steps(),
            indexer: Arc::new(NullIndexer),
            freshly_synced: false,
        }
    }

    /// Replace the migration registry.
    pub fn with_migrations(mut self, migrations: MigrationRunner) -> Self {
        self.migrations = migrations;
        self
    }

    /// Set the full-text indexer driven by `FullDeviceResync`.
    pub fn with_indexer(mut self, indexer: Arc<dyn ResyncIndexer>) -> Self {
        self.indexer = indexer;
        self
    }

    /// Mark this login as following a fresh device sync, which triggers the
    /// `FullDeviceResync` state.
    pub fn with_freshly_synced(mut self, freshly_synced: bool) -> Self {
        self.freshly_synced = freshly_synced;
        self
    }

    fn emit(&self, state: LoginState) {
        debug!(state = ?state, "Login transition");
        self.sink.send(SessionEvent::LoginState { state });
    }

    /// Run the flow to completion or failure.
    ///
    /// On failure any opened drive handle is closed and no partial identity
    /// is retained; the terminal event carries the structured error.
    pub async fn run(&self, password: &str) -> Result<SessionContext> {
        match self.run_inner(password).await {
            Ok(ctx) => {
                self.emit(LoginState::Ready);
                self.sink.send(SessionEvent::LoginComplete {
                    uid: ctx.account.uid.clone(),
                    device_id: ctx.device.device_id.clone(),
                });
                Ok(ctx)
            }
            Err(e) => {
                self.emit(LoginState::Failed);
                self.sink.send(SessionEvent::LoginFailed {
                    error: ErrorReport::from_error(&e),
                });
                Err(e)
            }
        }
    }

    async fn run_inner(&self, password: &str) -> Result<SessionContext> {
        self.emit(LoginState::Start);

        let store = VaultStore::new(self.paths.account_dir(), self.paths.drive_dir());

        self.emit(LoginState::DecryptVault);
        let mut device = store.get_device_info(password).await?;

        let vault_payload: Option<VaultPayload> =
            match store.get_vault(password, VaultKind::Vault, None).await {
                Ok(value) => Some(serde_json::from_value(value)?),
                Err(e) if e.is_vault_not_found() => {
                    // The single tolerated failure: accounts that never
                    // finished onboarding have no vault file yet
                    warn!("Vault file missing; continuing login without it");
                    None
                }
                Err(e) => return Err(e),
            };

        // Legacy schema upgrades run before the drive is opened
        if let Some(info) = device.as_mut()
            && info.drive_version.as_deref() != Some(DRIVE_VERSION)
        {
            self.emit(LoginState::MigrateLegacySchema);
            let ctx = MigrationContext {
                account_dir: self.paths.account_dir(),
                drive_dir: self.paths.drive_dir(),
            };
            self.migrations
                .run_pending(info.drive_version.as_deref(), &ctx)
                .await?;
            info.drive_version = Some(DRIVE_VERSION.to_string());
            store.set_device_info(info, password).await?;
        }

        self.emit(LoginState::OpenDrive);
        let drive_key = device
            .as_ref()
            .map(|d| d.drive_syncing_public_key.clone())
            .unwrap_or_else(|| format!("local/{}", self.paths.email()));
        let drive = self
            .drives
            .open(DriveOpenOptions {
                dir: self.paths.drive_dir(),
                drive_key,
                encryption_key: vault_payload
                    .as_ref()
                    .map(|p| p.drive_encryption_key.clone()),
                broadcast: true,
                read_only: false,
            })
            .await?;
        drive.ready().await?;

        match self.finish(password, &store, &drive, device).await {
            Ok((account, device)) => Ok(SessionContext {
                account,
                device,
                drive,
                paths: self.paths.clone(),
                store,
            }),
            Err(e) => {
                // Release the handle; the failure event is emitted by run()
                let _ = drive.close().await;
                Err(e)
            }
        }
    }

    /// States that run against the opened drive.
    async fn finish(
        &self,
        password: &str,
        store: &VaultStore,
        drive: &Arc<dyn Drive>,
        device: Option<DeviceInfo>,
    ) -> Result<(AccountIdentity, DeviceInfo)> {
        self.emit(LoginState::LoadAccountDocument);
        let accounts = drive.collection(ACCOUNT_COLLECTION)?;
        let doc = accounts
            .find_one(&json!({}))
            .await?
            .ok_or(LoginError::AccountMissing)?;
        let mut account: AccountIdentity =
            serde_json::from_value(doc).map_err(|e| LoginError::MalformedAccount {
                reason: e.to_string(),
            })?;

        // Legacy accounts predate the device-info file; synthesize one
        let mut device = match device {
            Some(info) => info,
            None => {
                self.emit(LoginState::BackfillDeviceInfo);
                let info = DeviceInfo {
                    key_pair: account
                        .signing_keypair
                        .clone()
                        .unwrap_or_else(keys::generate_signing_keypair),
                    device_id: uuid::Uuid::new_v4().to_string(),
                    device_type: DeviceType::default(),
                    server_sig: None,
                    drive_version: Some(DRIVE_VERSION.to_string()),
                    drive_syncing_public_key: account.drive_syncing_public_key.clone(),
                };
                store.set_device_info(&info, password).await?;
                info
            }
        };

        if device.server_sig.is_none() {
            self.emit(LoginState::RegisterDeviceWithServer);
            let claims = AuthClaims::derive(&account, &device)?;
            let server_sig = self.remote.register_new_device(&claims).await?;
            device.server_sig = Some(server_sig);
            store.set_device_info(&device, password).await?;
        }

        self.emit(LoginState::EnsureSigningKeys);
        if account.signing_keypair.is_none() {
            // Self-healing: can run on any login, not just the first
            let keypair = keys::generate_signing_keypair();
            let claims = AuthClaims::derive(&account, &device)?;
            self.remote
                .register_signing_key(&claims, &keypair.public)
                .await?;

            let now = chrono::Utc::now().to_rfc3339();
            let keypair_value = serde_json::to_value(&keypair)?;
            accounts
                .update(
                    &json!({"uid": account.uid}),
                    &json!({"signing_keypair": keypair_value, "updated_at": now}),
                )
                .await?;
            account.signing_keypair = Some(keypair);
            account.updated_at = now;
        }

        if self.freshly_synced {
            self.emit(LoginState::FullDeviceResync);
            let report = resync::full_device_resync(drive.as_ref(), self.indexer.as_ref()).await?;
            self.sink.send(SessionEvent::ResyncComplete {
                emails: report.emails,
                contacts: report.contacts,
            });
        }

        self.migrate_vault_to_content_store(drive).await?;

        self.emit(LoginState::AttachChangeListeners);
        self.attach_change_listeners(drive);

        Ok((account, device))
    }

    /// Mirror the secret files into the content store when their records
    /// predate that feature.
    async fn migrate_vault_to_content_store(&self, drive: &Arc<dyn Drive>) -> Result<()> {
        let files = drive.collection(FILE_COLLECTION)?;
        let vault_record = files.find_one(&json!({"path": VAULT_PATH})).await?;

        let needs_mirror = match &vault_record {
            Some(record) => record
                .get("content_id")
                .is_none_or(serde_json::Value::is_null),
            None => false,
        };
        if !needs_mirror {
            return Ok(());
        }

        self.emit(LoginState::MigrateVaultToContentStore);
        for path in [VAULT_PATH, RECOVERY_PATH] {
            let bytes = match drive.read_file(path).await {
                Ok(bytes) => bytes,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            let upload_id = self.content.add(&bytes).await?;
            let status = self.content.status(&upload_id).await?;
            if let Some(cid) = status.cid {
                files
                    .update(&json!({"path": path}), &json!({"content_id": cid}))
                    .await?;
            }
        }
        Ok(())
    }

    /// Forward drive events to the session sink until either side goes away.
    fn attach_change_listeners(&self, drive: &Arc<dyn Drive>) {
        let mut events = drive.subscribe();
        let sink = self.sink.clone();
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let session_event = match event {
                    DriveEvent::NetworkUpdated => SessionEvent::DriveUpdate {
                        kind: "network-updated".to_string(),
                        collection: None,
                    },
                    DriveEvent::CollectionUpdate { collection } => SessionEvent::DriveUpdate {
                        kind: "collection-update".to_string(),
                        collection: Some(collection),
                    },
                    DriveEvent::FileAdded { path } => SessionEvent::DriveUpdate {
                        kind: "file-added".to_string(),
                        collection: Some(path),
                    },
                };
                sink.send(session_event);
                if sink.is_closed() {
                    break;
                }
            }
        });
    }
}
