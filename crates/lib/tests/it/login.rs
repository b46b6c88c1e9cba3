//! Login state machine tests.

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use async_trait::async_trait;
use serde_json::json;

use covault::{
    Result,
    account::DeviceType,
    constants::DRIVE_VERSION,
    login::{LoginState, LoginStateMachine, MigrationContext, MigrationRunner, MigrationStep},
    session::{EventSink, SessionEvent},
    vault::VaultStore,
};

use crate::helpers::{TestEnv, drain};

const EMAIL: &str = "alice@covault.test";
const PASSWORD: &str = "hunter2";

struct CountingStep {
    runs: Arc<AtomicU32>,
}

#[async_trait]
impl MigrationStep for CountingStep {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn applies_to(&self, version: Option<&str>) -> bool {
        version != Some(DRIVE_VERSION)
    }

    async fn run(&self, _ctx: &MigrationContext) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_create_then_login_round_trip() {
    let env = TestEnv::new();
    let (manager, mut events) = env.manager("device-a");

    let created = manager
        .create_account(EMAIL, PASSWORD, DeviceType::Desktop)
        .await
        .unwrap();
    let uid = created.account.uid.clone();
    let device_id = created.device.device_id.clone();
    created.close().await.unwrap();

    let ctx = manager.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(ctx.account.uid, uid);
    // Same physical device keeps its identity across logins
    assert_eq!(ctx.device.device_id, device_id);
    assert!(ctx.device.server_sig.is_some());

    let events = drain(&mut events);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::LoginState { state: LoginState::Ready }))
    );
    assert!(
        events
            .iter()
            .any(|e| matches!(e, SessionEvent::LoginComplete { .. }))
    );
    // Schema already current: no migration pass
    assert!(!events.iter().any(|e| matches!(
        e,
        SessionEvent::LoginState {
            state: LoginState::MigrateLegacySchema
        }
    )));

    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_wrong_password_fails_with_decryption_error() {
    let env = TestEnv::new();
    let (manager, mut events) = env.manager("device-a");

    let ctx = manager
        .create_account(EMAIL, PASSWORD, DeviceType::Desktop)
        .await
        .unwrap();
    ctx.close().await.unwrap();
    drain(&mut events);

    let err = manager.login(EMAIL, "wrong").await.unwrap_err();
    assert!(err.is_decryption_error());

    let events = drain(&mut events);
    let failure = events
        .iter()
        .find_map(|e| match e {
            SessionEvent::LoginFailed { error } => Some(error),
            _ => None,
        })
        .expect("terminal failure event");
    assert_eq!(failure.name, "DecryptionError");
    assert_eq!(failure.message, "Unable to decrypt message.");
}

#[tokio::test]
async fn test_stale_schema_triggers_exactly_one_migration() {
    let env = TestEnv::new();
    let (manager, _events) = env.manager("device-a");

    let ctx = manager
        .create_account(EMAIL, PASSWORD, DeviceType::Desktop)
        .await
        .unwrap();
    ctx.close().await.unwrap();

    // Age the device back to a pre-2.0 schema
    let paths = manager.paths(EMAIL);
    let store = VaultStore::new(paths.account_dir(), paths.drive_dir());
    let mut device = store.get_device_info(PASSWORD).await.unwrap().unwrap();
    device.drive_version = Some("1.0".to_string());
    store.set_device_info(&device, PASSWORD).await.unwrap();

    let runs = Arc::new(AtomicU32::new(0));
    let machine = |sink| {
        LoginStateMachine::new(
            paths.clone(),
            env.drives.clone(),
            env.content.clone(),
            env.remote.clone(),
            sink,
        )
        .with_migrations(MigrationRunner::new(vec![Arc::new(CountingStep {
            runs: runs.clone(),
        })]))
    };

    let (sink, mut events) = EventSink::channel();
    let ctx = machine(sink).run(PASSWORD).await.unwrap();
    ctx.close().await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        SessionEvent::LoginState {
            state: LoginState::MigrateLegacySchema
        }
    )));

    // The version was persisted; a second login migrates nothing
    let (sink, mut events) = EventSink::channel();
    let ctx = machine(sink).run(PASSWORD).await.unwrap();
    ctx.close().await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(!drain(&mut events).iter().any(|e| matches!(
        e,
        SessionEvent::LoginState {
            state: LoginState::MigrateLegacySchema
        }
    )));
}

#[tokio::test]
async fn test_missing_vault_file_is_tolerated() {
    let env = TestEnv::new();
    let (manager, _events) = env.manager("device-a");

    let ctx = manager
        .create_account(EMAIL, PASSWORD, DeviceType::Desktop)
        .await
        .unwrap();
    ctx.close().await.unwrap();

    // An account that never finished onboarding has no local vault file
    let vault_path = manager.paths(EMAIL).drive_dir().join("vault");
    std::fs::remove_file(&vault_path).unwrap();

    let ctx = manager.login(EMAIL, PASSWORD).await.unwrap();
    assert_eq!(ctx.paths.email(), EMAIL);
    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_signing_key_backfill_self_heals() {
    let env = TestEnv::new();
    let (manager, _events) = env.manager("device-a");

    let ctx = manager
        .create_account(EMAIL, PASSWORD, DeviceType::Desktop)
        .await
        .unwrap();

    // A legacy account document without a signing keypair
    ctx.drive
        .collection("account")
        .unwrap()
        .update(&json!({}), &json!({"signing_keypair": null}))
        .await
        .unwrap();
    ctx.close().await.unwrap();

    let ctx = manager.login(EMAIL, PASSWORD).await.unwrap();
    assert!(ctx.account.signing_keypair.is_some());

    // And it was persisted back to the account document
    let doc = ctx
        .drive
        .collection("account")
        .unwrap()
        .find_one(&json!({}))
        .await
        .unwrap()
        .unwrap();
    assert!(doc.get("signing_keypair").is_some_and(|v| !v.is_null()));

    ctx.close().await.unwrap();
}

#[tokio::test]
async fn test_vault_mirrored_to_content_store_when_record_predates_it() {
    let env = TestEnv::new();
    let (manager, mut events) = env.manager("device-a");

    let ctx = manager
        .create_account(EMAIL, PASSWORD, DeviceType::Desktop)
        .await
        .unwrap();

    // Simulate a schema that predates the content-store mirror
    ctx.drive
        .collection("file")
        .unwrap()
        .update(&json!({"path": "/vault"}), &json!({"content_id": null}))
        .await
        .unwrap();
    ctx.close().await.unwrap();
    drain(&mut events);

    let ctx = manager.login(EMAIL, PASSWORD).await.unwrap();

    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        SessionEvent::LoginState {
            state: LoginState::MigrateVaultToContentStore
        }
    )));

    let record = ctx
        .drive
        .collection("file")
        .unwrap()
        .find_one(&json!({"path": "/vault"}))
        .await
        .unwrap()
        .unwrap();
    assert!(record.get("content_id").is_some_and(|v| !v.is_null()));

    ctx.close().await.unwrap();
}
