//! Device synchronization module
//!
//! Bootstraps a brand-new device from an existing account: a short-lived
//! sync code (resolved out-of-band into a drive key and email) locates the
//! peer's drive; a read-only scratch replica is used to recover the secret
//! files; the real drive is then reopened under the recovered key and the
//! device registers itself and hands off into the login flow.

pub mod errors;
pub mod resync;
pub mod wait;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

pub use errors::SyncError;
pub use resync::{NullIndexer, ResyncIndexer, ResyncReport};
pub use wait::WaitOptions;

use crate::{
    Result,
    account::{DeviceInfo, DeviceType, VaultPayload, keys},
    cancel::CancellationToken,
    constants::{BASELINE_COLLECTIONS, DRIVE_VERSION},
    content::ContentStore,
    drive::{Drive, DriveOpenOptions, DriveProvider},
    login::LoginStateMachine,
    remote::AccountService,
    session::{ErrorReport, EventSink, SessionContext, SessionEvent, SessionPaths},
    vault::{VaultKind, VaultStore},
};

/// Phases of the device-sync flow, reported as progress events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPhase {
    OpenScratchReplica,
    RecoveryAvailable,
    VaultAvailable,
    OpenAccountDrive,
    BaselineReplicated,
    PersistDeviceInfo,
}

/// Per-attempt bookkeeping; discarded on completion or failure.
#[derive(Default)]
struct SyncSession {
    has_recovery: bool,
    has_vault: bool,
    drive_synced: bool,
}

/// Bootstraps this device from an existing account's drive.
pub struct DeviceSyncOrchestrator {
    paths: SessionPaths,
    drives: Arc<dyn DriveProvider>,
    content: Arc<dyn ContentStore>,
    remote: Arc<dyn AccountService>,
    sink: EventSink,
    indexer: Arc<dyn ResyncIndexer>,
    token: CancellationToken,
    file_wait: WaitOptions,
    baseline_wait: WaitOptions,
}

impl DeviceSyncOrchestrator {
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
            indexer: Arc::new(NullIndexer),
            token: CancellationToken::never(),
            file_wait: WaitOptions::default(),
            // Baseline polling uses a fixed interval, no backoff
            baseline_wait: WaitOptions {
                interval: std::time::Duration::from_millis(500),
                max_interval: std::time::Duration::from_millis(500),
                max_attempts: 240,
            },
        }
    }

    /// Observe a caller-held cancellation token so a stuck sync can be
    /// aborted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Set the full-text indexer used by the handed-off login's resync.
    pub fn with_indexer(mut self, indexer: Arc<dyn ResyncIndexer>) -> Self {
        self.indexer = indexer;
        self
    }

    /// Override the secret-file wait bounds.
    pub fn with_file_wait(mut self, opts: WaitOptions) -> Self {
        self.file_wait = opts;
        self
    }

    /// Override the baseline-collection poll bounds.
    pub fn with_baseline_wait(mut self, opts: WaitOptions) -> Self {
        self.baseline_wait = opts;
        self
    }

    fn emit(&self, phase: SyncPhase) {
        debug!(phase = ?phase, "Sync transition");
        self.sink.send(SessionEvent::SyncPhase { phase });
    }

    /// Run the flow to completion or failure.
    ///
    /// There is no partial-state resume: any failure cleans up the scratch
    /// replica and its directory, and a retry restarts from the first phase.
    pub async fn run(
        &self,
        drive_key: &str,
        password: &str,
        device_type: DeviceType,
    ) -> Result<SessionContext> {
        match self.run_inner(drive_key, password, device_type).await {
            Ok(ctx) => {
                info!(device_id = %ctx.device.device_id, "Device sync complete");
                self.sink.send(SessionEvent::SyncComplete {
                    device_id: ctx.device.device_id.clone(),
                });
                Ok(ctx)
            }
            Err(e) => {
                self.sink.send(SessionEvent::SyncFailed {
                    error: ErrorReport::from_error(&e),
                });
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        drive_key: &str,
        password: &str,
        device_type: DeviceType,
    ) -> Result<SessionContext> {
        let mut session = SyncSession::default();

        // Phase 1: fresh working area, read-only non-broadcasting replica
        let scratch_dir = self.paths.scratch_dir();
        if tokio::fs::try_exists(&scratch_dir).await? {
            tokio::fs::remove_dir_all(&scratch_dir).await?;
        }
        tokio::fs::create_dir_all(&scratch_dir).await?;

        self.emit(SyncPhase::OpenScratchReplica);
        let scratch = self
            .drives
            .open(DriveOpenOptions::scratch_replica(
                scratch_dir.clone(),
                drive_key,
            ))
            .await?;
        scratch.ready().await?;

        // Phases 2–3: recover the vault, then discard the scratch replica
        // entirely
        let payload = match self
            .recover_vault(&scratch_dir, password, &mut session)
            .await
        {
            Ok(payload) => {
                scratch.close().await?;
                tokio::fs::remove_dir_all(&scratch_dir).await?;
                payload
            }
            Err(e) => {
                let _ = scratch.close().await;
                let _ = tokio::fs::remove_dir_all(&scratch_dir).await;
                return Err(e);
            }
        };

        // Phase 4: the account's real drive, as a full participant
        self.emit(SyncPhase::OpenAccountDrive);
        let drive = self
            .drives
            .open(DriveOpenOptions::participant(
                self.paths.drive_dir(),
                drive_key,
                &payload.drive_encryption_key,
            ))
            .await?;
        drive.ready().await?;

        let adopted = self
            .adopt(&drive, drive_key, password, device_type, &payload, &mut session)
            .await;
        if let Err(e) = adopted {
            let _ = drive.close().await;
            return Err(e);
        }

        debug!(
            has_recovery = session.has_recovery,
            has_vault = session.has_vault,
            drive_synced = session.drive_synced,
            "Sync session satisfied"
        );

        // Phase 6 handoff: exactly one drive handle at a time, so close
        // before the login flow reopens
        drive.close().await?;

        let login = LoginStateMachine::new(
            self.paths.clone(),
            self.drives.clone(),
            self.content.clone(),
            self.remote.clone(),
            self.sink.clone(),
        )
        .with_indexer(self.indexer.clone())
        .with_freshly_synced(true);

        login.run(password).await
    }

    /// Wait for the two secret files on the scratch replica and decrypt the
    /// vault.
    async fn recover_vault(
        &self,
        scratch_dir: &Path,
        password: &str,
        session: &mut SyncSession,
    ) -> Result<VaultPayload> {
        self.wait_for_file(scratch_dir, VaultKind::Recovery).await?;
        session.has_recovery = true;
        self.emit(SyncPhase::RecoveryAvailable);

        self.wait_for_file(scratch_dir, VaultKind::Vault).await?;
        session.has_vault = true;
        self.emit(SyncPhase::VaultAvailable);

        let store = VaultStore::new(self.paths.account_dir(), self.paths.drive_dir());
        let value = store
            .get_vault(password, VaultKind::Vault, Some(scratch_dir))
            .await?;
        let payload: VaultPayload =
            serde_json::from_value(value).map_err(|e| SyncError::InvalidVaultPayload {
                reason: e.to_string(),
            })?;

        if payload.drive_encryption_key.is_empty() {
            return Err(SyncError::InvalidVaultPayload {
                reason: "Missing drive encryption key".to_string(),
            }
            .into());
        }

        Ok(payload)
    }

    async fn wait_for_file(&self, scratch_dir: &Path, kind: VaultKind) -> Result<()> {
        let path = scratch_dir.join(kind.file_name());
        wait::wait_for(
            &format!("{} file", kind.file_name()),
            self.file_wait,
            &self.token,
            || {
                let path = path.clone();
                async move { Ok(tokio::fs::try_exists(&path).await?.then_some(())) }
            },
        )
        .await
    }

    /// Phases 5–6 against the opened account drive: wait for the baseline
    /// collections, then persist this device's identity.
    async fn adopt(
        &self,
        drive: &Arc<dyn Drive>,
        drive_key: &str,
        password: &str,
        device_type: DeviceType,
        payload: &VaultPayload,
        session: &mut SyncSession,
    ) -> Result<()> {
        // A coarse heuristic for "initial data has replicated": each
        // baseline collection has at least one row
        for name in BASELINE_COLLECTIONS {
            let collection = drive.collection(name)?;
            wait::wait_for(
                &format!("baseline collection '{name}'"),
                self.baseline_wait,
                &self.token,
                || {
                    let collection = collection.clone();
                    async move {
                        let rows = collection.find(&json!({})).await?;
                        Ok((!rows.is_empty()).then_some(()))
                    }
                },
            )
            .await?;
        }
        session.drive_synced = true;
        self.emit(SyncPhase::BaselineReplicated);

        self.emit(SyncPhase::PersistDeviceInfo);
        let device = DeviceInfo {
            // Reuse the account signing keypair recovered from the vault
            // when present
            key_pair: payload
                .key_pair
                .clone()
                .unwrap_or_else(keys::generate_signing_keypair),
            device_id: uuid::Uuid::new_v4().to_string(),
            device_type,
            server_sig: None,
            drive_version: Some(DRIVE_VERSION.to_string()),
            drive_syncing_public_key: drive_key.to_string(),
        };

        let store = VaultStore::new(self.paths.account_dir(), self.paths.drive_dir());
        store.set_device_info(&device, password).await?;
        tokio::fs::write(self.paths.vault_seen_path(), b"1").await?;

        Ok(())
    }
}
