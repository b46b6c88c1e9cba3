//! Progress and terminal events surfaced to the calling process
//!
//! Flows communicate one-directionally: a stream of progress events
//! terminated by exactly one success or one failure event. The caller never
//! polls, and must not assume any particular number or spacing of progress
//! events before the terminal one.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::{Error, login::LoginState, sync::SyncPhase};

/// Structured error surfaced over the event channel.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorReport {
    /// Stable taxonomy name (e.g. `DecryptionError`, `NetworkError`).
    pub name: String,
    pub message: String,
    /// Source chain, outermost first.
    pub chain: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(error: &Error) -> Self {
        let name = if error.is_decryption_error() {
            "DecryptionError"
        } else if error.is_vault_not_found() {
            "VaultNotFoundError"
        } else if error.is_migration_error() {
            "MigrationError"
        } else if error.is_network_error() {
            "NetworkError"
        } else if error.is_replication_incomplete() {
            "ReplicationIncompleteError"
        } else if error.is_cancelled() {
            "SyncCancelledError"
        } else {
            match error {
                Error::Vault(_) => "VaultError",
                Error::Login(_) => "LoginError",
                Error::Sync(_) => "SyncError",
                Error::Drive(_) => "DriveError",
                Error::Content(_) => "ContentStoreError",
                Error::Remote(_) => "AccountServiceError",
                Error::Io(_) => "IoError",
                Error::Serialize(_) => "SerializationError",
            }
        };

        let mut chain = Vec::new();
        let mut source = std::error::Error::source(error);
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        Self {
            name: name.to_string(),
            message: error.to_string(),
            chain,
        }
    }
}

/// Events emitted by the login and device-sync flows.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// Login state machine entered a state.
    LoginState { state: LoginState },
    /// Device sync reached a phase.
    SyncPhase { phase: SyncPhase },
    /// Drive activity observed after listeners attached.
    DriveUpdate {
        kind: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        collection: Option<String>,
    },
    /// Full-device resync passes completed.
    ResyncComplete { emails: bool, contacts: bool },
    /// Terminal: login succeeded.
    LoginComplete { uid: String, device_id: String },
    /// Terminal: login failed.
    LoginFailed { error: ErrorReport },
    /// Terminal: device sync succeeded (followed by the handed-off login's
    /// own events).
    SyncComplete { device_id: String },
    /// Terminal: device sync failed.
    SyncFailed { error: ErrorReport },
    /// Terminal: account created.
    AccountCreated { uid: String },
}

/// Sending half of the session event stream.
///
/// Cloneable; sends never block and silently drop once the receiver is gone
/// (a departed caller must not wedge a flow mid-transition).
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    /// Create a sink and its receiving stream.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Whether the receiving side is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
