//! Command dispatch
//!
//! Every inbound command is resolved through a single dispatch table keyed
//! by command name, mapping to exactly one handler.

use std::{path::PathBuf, pin::Pin, sync::Arc};

use serde::Deserialize;
use serde_json::{Value, json};

use covault::{
    Result,
    account::{AccountManager, DeviceType},
    cancel::Canceller,
    content::MemoryContentStore,
    drive::LocalDriveProvider,
    remote::LocalAccountService,
    session::{EventSink, SessionContext},
};

/// Process-wide state shared by the handlers.
pub struct AppState {
    pub manager: AccountManager,
    /// The single logical session of this process.
    session: tokio::sync::Mutex<Option<SessionContext>>,
    /// Canceller of an in-flight device sync.
    sync_canceller: tokio::sync::Mutex<Option<Canceller>>,
}

impl AppState {
    pub fn new(data_dir: PathBuf, sink: EventSink) -> Self {
        let manager = AccountManager::new(
            data_dir,
            Arc::new(LocalDriveProvider::new()),
            Arc::new(MemoryContentStore::new()),
            Arc::new(LocalAccountService::new()),
            sink,
        );
        Self {
            manager,
            session: tokio::sync::Mutex::new(None),
            sync_canceller: tokio::sync::Mutex::new(None),
        }
    }
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;
type Handler = fn(Arc<AppState>, Value) -> HandlerFuture;

/// The dispatch table.
const HANDLERS: &[(&str, Handler)] = &[
    ("account:create", handle_account_create),
    ("account:login", handle_account_login),
    ("account:logout", handle_account_logout),
    ("account:remove", handle_account_remove),
    ("password:recover", handle_password_recover),
    ("password:reset", handle_password_reset),
    ("synccode:create", handle_sync_code_create),
    ("device:sync", handle_device_sync),
    ("device:sync:cancel", handle_device_sync_cancel),
];

/// Resolve a command name to its handler.
pub fn lookup(command: &str) -> Option<Handler> {
    HANDLERS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, handler)| *handler)
}

/// Names of all registered commands, for error messages.
pub fn command_names() -> Vec<&'static str> {
    HANDLERS.iter().map(|(name, _)| *name).collect()
}

#[derive(Deserialize)]
struct CredentialParams {
    email: String,
    password: String,
    #[serde(default)]
    device_type: Option<DeviceType>,
}

#[derive(Deserialize)]
struct RecoverParams {
    email: String,
    mnemonic: String,
}

#[derive(Deserialize)]
struct ResetParams {
    email: String,
    old_password: String,
    new_password: String,
}

#[derive(Deserialize)]
struct SyncParams {
    code: String,
    password: String,
    #[serde(default)]
    device_type: Option<DeviceType>,
}

#[derive(Deserialize)]
struct EmailParams {
    email: String,
}

fn handle_account_create(state: Arc<AppState>, data: Value) -> HandlerFuture {
    Box::pin(async move {
        let params: CredentialParams = serde_json::from_value(data)?;
        let ctx = state
            .manager
            .create_account(
                &params.email,
                &params.password,
                params.device_type.unwrap_or_default(),
            )
            .await?;

        let uid = ctx.account.uid.clone();
        let device_id = ctx.device.device_id.clone();
        *state.session.lock().await = Some(ctx);

        Ok(json!({"uid": uid, "device_id": device_id}))
    })
}

fn handle_account_login(state: Arc<AppState>, data: Value) -> HandlerFuture {
    Box::pin(async move {
        let params: CredentialParams = serde_json::from_value(data)?;
        let ctx = state.manager.login(&params.email, &params.password).await?;

        let uid = ctx.account.uid.clone();
        *state.session.lock().await = Some(ctx);

        Ok(json!({"uid": uid}))
    })
}

fn handle_account_logout(state: Arc<AppState>, _data: Value) -> HandlerFuture {
    Box::pin(async move {
        if let Some(ctx) = state.session.lock().await.take() {
            ctx.close().await?;
        }
        Ok(json!({}))
    })
}

fn handle_account_remove(state: Arc<AppState>, data: Value) -> HandlerFuture {
    Box::pin(async move {
        let params: EmailParams = serde_json::from_value(data)?;
        state.manager.remove_local_account(&params.email).await?;
        Ok(json!({}))
    })
}

fn handle_password_recover(state: Arc<AppState>, data: Value) -> HandlerFuture {
    Box::pin(async move {
        let params: RecoverParams = serde_json::from_value(data)?;
        let master_pass = state
            .manager
            .recover_master_password(&params.email, &params.mnemonic)
            .await?;
        Ok(json!({"master_pass": master_pass}))
    })
}

fn handle_password_reset(state: Arc<AppState>, data: Value) -> HandlerFuture {
    Box::pin(async move {
        let params: ResetParams = serde_json::from_value(data)?;
        state
            .manager
            .reset_password(&params.email, &params.old_password, &params.new_password)
            .await?;
        Ok(json!({}))
    })
}

fn handle_sync_code_create(state: Arc<AppState>, _data: Value) -> HandlerFuture {
    Box::pin(async move {
        let session = state.session.lock().await;
        let ctx = session.as_ref().ok_or_else(not_logged_in)?;
        let code = state.manager.create_sync_code(ctx).await?;
        Ok(json!({"code": code}))
    })
}

fn handle_device_sync(state: Arc<AppState>, data: Value) -> HandlerFuture {
    Box::pin(async move {
        let params: SyncParams = serde_json::from_value(data)?;

        let canceller = Canceller::new();
        let token = canceller.token();
        *state.sync_canceller.lock().await = Some(canceller);

        let result = state
            .manager
            .sync_device_with(
                &params.code,
                &params.password,
                params.device_type.unwrap_or_default(),
                token,
            )
            .await;
        *state.sync_canceller.lock().await = None;

        let ctx = result?;
        let device_id = ctx.device.device_id.clone();
        *state.session.lock().await = Some(ctx);

        Ok(json!({"device_id": device_id}))
    })
}

fn handle_device_sync_cancel(state: Arc<AppState>, _data: Value) -> HandlerFuture {
    Box::pin(async move {
        if let Some(canceller) = state.sync_canceller.lock().await.as_ref() {
            canceller.cancel();
        }
        Ok(json!({}))
    })
}

fn not_logged_in() -> covault::Error {
    covault::remote::RemoteError::Rejected {
        reason: "No active session".to_string(),
    }
    .into()
}
