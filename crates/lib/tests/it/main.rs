/*! Integration tests for Covault.
 *
 * This test suite is organized as a single integration test binary.
 * The module structure mirrors the main library structure:
 * - vault: Tests for the vault store and the recovery chain
 * - login: Tests for the login state machine
 * - device_sync: Tests for the device-sync orchestrator
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("covault=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod device_sync;
mod helpers;
mod login;
mod vault;
