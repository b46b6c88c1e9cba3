//! Shared fixtures for the integration tests.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use covault::{
    account::AccountManager,
    content::MemoryContentStore,
    drive::LocalDriveProvider,
    remote::LocalAccountService,
    session::{EventSink, SessionEvent},
    sync::WaitOptions,
};

/// One in-process world: collaborators shared by every simulated device.
pub struct TestEnv {
    pub tmp: tempfile::TempDir,
    pub drives: Arc<LocalDriveProvider>,
    pub content: Arc<MemoryContentStore>,
    pub remote: Arc<LocalAccountService>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            tmp: tempfile::tempdir().unwrap(),
            drives: Arc::new(LocalDriveProvider::new()),
            content: Arc::new(MemoryContentStore::new()),
            remote: Arc::new(LocalAccountService::new()),
        }
    }

    /// An account manager rooted in its own directory, modeling one physical
    /// device sharing the world's collaborators.
    pub fn manager(&self, device: &str) -> (AccountManager, UnboundedReceiver<SessionEvent>) {
        let (sink, events) = EventSink::channel();
        let manager = AccountManager::new(
            self.tmp.path().join(device),
            self.drives.clone(),
            self.content.clone(),
            self.remote.clone(),
            sink,
        );
        (manager, events)
    }
}

/// Collect everything currently buffered on an event stream.
pub fn drain(events: &mut UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Tight polling bounds so failing waits exhaust quickly.
pub fn quick_wait(max_attempts: u32) -> WaitOptions {
    WaitOptions {
        interval: Duration::from_millis(5),
        max_interval: Duration::from_millis(10),
        max_attempts,
    }
}
