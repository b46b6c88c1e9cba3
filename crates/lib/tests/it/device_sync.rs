//! Device-sync orchestrator tests.

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use serde_json::json;

use covault::{
    Result,
    account::DeviceType,
    cancel::Canceller,
    drive::{FileMeta, WriteOptions},
    session::{EventSink, SessionEvent, SessionPaths},
    sync::{DeviceSyncOrchestrator, ResyncIndexer, SyncPhase},
};

use crate::helpers::{TestEnv, drain, quick_wait};

const EMAIL: &str = "alice@covault.test";
const PASSWORD: &str = "hunter2";

#[tokio::test]
async fn test_new_device_bootstraps_from_sync_code() {
    let env = TestEnv::new();
    let (manager_a, _events_a) = env.manager("device-a");
    let (manager_b, mut events_b) = env.manager("device-b");

    let ctx_a = manager_a
        .create_account(EMAIL, PASSWORD, DeviceType::Desktop)
        .await
        .unwrap();
    let code = manager_a.create_sync_code(&ctx_a).await.unwrap();

    let ctx_b = manager_b
        .sync_device(&code, PASSWORD, DeviceType::Mobile)
        .await
        .unwrap();

    // Fresh device identity, identical account identity
    assert_ne!(ctx_b.device.device_id, ctx_a.device.device_id);
    assert_eq!(
        ctx_b.account.drive_encryption_key,
        ctx_a.account.drive_encryption_key
    );
    assert_eq!(
        ctx_b.account.signing_keypair.as_ref().unwrap().public,
        ctx_a.account.signing_keypair.as_ref().unwrap().public
    );
    assert!(ctx_b.device.server_sig.is_some());

    // The local vault-seen flag was written on the new device
    assert!(manager_b.paths(EMAIL).vault_seen_path().exists());
    // The scratch replica was discarded
    assert!(!manager_b.paths(EMAIL).scratch_dir().exists());

    let events = drain(&mut events_b);
    for phase in [
        SyncPhase::RecoveryAvailable,
        SyncPhase::VaultAvailable,
        SyncPhase::BaselineReplicated,
    ] {
        assert!(
            events
                .iter()
                .any(|e| matches!(e, SessionEvent::SyncPhase { phase: p } if *p == phase)),
            "missing phase event {phase:?}"
        );
    }
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::SyncComplete { .. }))
    );
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::LoginComplete { .. }))
    );

    ctx_b.close().await.unwrap();
    ctx_a.close().await.unwrap();
}

struct RecordingIndexer {
    emails: AtomicU32,
    contacts: AtomicU32,
}

#[async_trait]
impl ResyncIndexer for RecordingIndexer {
    async fn index_email(&self, _file: &FileMeta) -> Result<()> {
        self.emails.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rebuild_contacts(&self) -> Result<()> {
        self.contacts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_full_device_resync_rebuilds_indexes() {
    let env = TestEnv::new();
    let (manager_a, _events_a) = env.manager("device-a");

    let ctx_a = manager_a
        .create_account(EMAIL, PASSWORD, DeviceType::Desktop)
        .await
        .unwrap();
    ctx_a
        .drive
        .write_file("/email/msg-1.eml", b"Subject: hi", WriteOptions::default())
        .await
        .unwrap();
    ctx_a
        .drive
        .write_file("/email/msg-2.eml", b"Subject: re", WriteOptions::default())
        .await
        .unwrap();

    let indexer = Arc::new(RecordingIndexer {
        emails: AtomicU32::new(0),
        contacts: AtomicU32::new(0),
    });
    let (sink, mut events) = EventSink::channel();
    let ctx_b = DeviceSyncOrchestrator::new(
        SessionPaths::new(env.tmp.path().join("device-b"), EMAIL),
        env.drives.clone(),
        env.content.clone(),
        env.remote.clone(),
        sink,
    )
    .with_indexer(indexer.clone())
    .run(
        &ctx_a.account.drive_syncing_public_key,
        PASSWORD,
        DeviceType::Mobile,
    )
    .await
    .unwrap();

    assert_eq!(indexer.emails.load(Ordering::SeqCst), 2);
    assert_eq!(indexer.contacts.load(Ordering::SeqCst), 1);
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        SessionEvent::ResyncComplete {
            emails: true,
            contacts: true
        }
    )));

    ctx_b.close().await.unwrap();
    ctx_a.close().await.unwrap();
}

#[tokio::test]
async fn test_zero_mailboxes_exhausts_the_baseline_poll() {
    let env = TestEnv::new();
    let (manager_a, _events_a) = env.manager("device-a");

    let ctx_a = manager_a
        .create_account(EMAIL, PASSWORD, DeviceType::Desktop)
        .await
        .unwrap();
    // An account with zero mailboxes can never satisfy the baseline
    // heuristic; the bounded poll must exhaust rather than complete
    ctx_a
        .drive
        .collection("mailbox")
        .unwrap()
        .remove(&json!({}))
        .await
        .unwrap();

    let code = manager_a.create_sync_code(&ctx_a).await.unwrap();
    let info = {
        use covault::remote::AccountService;
        env.remote.get_sync_info(&code).await.unwrap()
    };

    let (sink, mut events) = EventSink::channel();
    let err = DeviceSyncOrchestrator::new(
        SessionPaths::new(env.tmp.path().join("device-b"), &info.email),
        env.drives.clone(),
        env.content.clone(),
        env.remote.clone(),
        sink,
    )
    .with_baseline_wait(quick_wait(3))
    .run(&info.drive_key, PASSWORD, DeviceType::Mobile)
    .await
    .unwrap_err();

    assert!(err.is_replication_incomplete());

    let failure = drain(&mut events)
        .into_iter()
        .find_map(|e| match e {
            SessionEvent::SyncFailed { error } => Some(error),
            _ => None,
        })
        .expect("terminal failure event");
    assert_eq!(failure.name, "ReplicationIncompleteError");

    ctx_a.close().await.unwrap();
}

#[tokio::test]
async fn test_cancellation_aborts_the_sync() {
    let env = TestEnv::new();
    let (manager_a, _events_a) = env.manager("device-a");
    let (manager_b, mut events_b) = env.manager("device-b");

    let ctx_a = manager_a
        .create_account(EMAIL, PASSWORD, DeviceType::Desktop)
        .await
        .unwrap();
    let code = manager_a.create_sync_code(&ctx_a).await.unwrap();

    let canceller = Canceller::new();
    canceller.cancel();

    let err = manager_b
        .sync_device_with(&code, PASSWORD, DeviceType::Mobile, canceller.token())
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    let events = drain(&mut events_b);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::SyncFailed { .. }))
    );

    ctx_a.close().await.unwrap();
}

#[tokio::test]
async fn test_wrong_password_cleans_up_the_scratch_replica() {
    let env = TestEnv::new();
    let (manager_a, _events_a) = env.manager("device-a");
    let (manager_b, _events_b) = env.manager("device-b");

    let ctx_a = manager_a
        .create_account(EMAIL, PASSWORD, DeviceType::Desktop)
        .await
        .unwrap();
    let code = manager_a.create_sync_code(&ctx_a).await.unwrap();

    let err = manager_b
        .sync_device(&code, "wrong", DeviceType::Mobile)
        .await
        .unwrap_err();
    assert!(err.is_decryption_error());
    assert!(!manager_b.paths(EMAIL).scratch_dir().exists());

    ctx_a.close().await.unwrap();
}
