//! Bounded, cancellable waits for replication progress
//!
//! Replication has no completion signal, so sync polls for observable
//! conditions. Every wait is bounded and cancellable: exhaustion surfaces as
//! `SyncError::ReplicationIncomplete`, a fired token as `SyncError::Cancelled`.

use std::time::Duration;

use tracing::trace;

use super::errors::SyncError;
use crate::{Result, cancel::CancellationToken};

/// Polling bounds for one wait.
#[derive(Clone, Copy, Debug)]
pub struct WaitOptions {
    /// Delay before the first re-probe.
    pub interval: Duration,

    /// Upper bound on the delay as backoff grows it.
    pub max_interval: Duration,

    /// Probe attempts before giving up.
    pub max_attempts: u32,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(5),
            max_attempts: 120,
        }
    }
}

/// Poll `probe` until it yields a value, the attempts are exhausted, or the
/// token fires. The delay between probes doubles up to `max_interval`.
pub async fn wait_for<T, F, Fut>(
    what: &str,
    opts: WaitOptions,
    token: &CancellationToken,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let mut delay = opts.interval;

    for attempt in 1..=opts.max_attempts {
        if token.is_cancelled() {
            return Err(SyncError::Cancelled.into());
        }

        if let Some(value) = probe().await? {
            trace!(what = %what, attempt, "Wait condition satisfied");
            return Ok(value);
        }

        if attempt == opts.max_attempts {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = token.cancelled() => return Err(SyncError::Cancelled.into()),
        }
        delay = (delay * 2).min(opts.max_interval);
    }

    Err(SyncError::ReplicationIncomplete {
        what: what.to_string(),
        attempts: opts.max_attempts,
    }
    .into())
}
