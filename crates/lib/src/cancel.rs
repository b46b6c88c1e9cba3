//! Cancellation for long-running flows
//!
//! Device sync waits on replication that may never finish; callers hold a
//! `Canceller` and hand its token into the flow so a stuck sync can be
//! aborted.

use tokio::sync::watch;

/// Caller-side handle that cancels every token derived from it.
pub struct Canceller {
    tx: watch::Sender<bool>,
}

impl Default for Canceller {
    fn default() -> Self {
        Self::new()
    }
}

impl Canceller {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Derive a token observing this canceller.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            rx: self.tx.subscribe(),
            _keep_alive: None,
        }
    }
}

/// Flow-side cancellation observer.
#[derive(Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
    /// Keeps the sender of a never-cancelled token alive.
    _keep_alive: Option<std::sync::Arc<watch::Sender<bool>>>,
}

impl CancellationToken {
    /// A token that never fires, for flows run without a caller-side
    /// canceller.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            rx,
            _keep_alive: Some(std::sync::Arc::new(tx)),
        }
    }

    /// Check cancellation without suspending.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Suspend until cancelled. Never resolves if the canceller is dropped
    /// without firing.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Canceller dropped without cancelling: stay pending
                std::future::pending::<()>().await;
            }
        }
    }
}
