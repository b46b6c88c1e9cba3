//! Legacy schema migrations
//!
//! Version upgrades are pluggable, idempotent steps selected by the
//! account's stored schema version. The login flow runs the pending steps at
//! most once per account, before the drive is opened, and folds any step
//! failure into an isolated `LoginError::Migration`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::errors::LoginError;
use crate::Result;

/// Paths a migration step may rearrange.
pub struct MigrationContext {
    pub account_dir: PathBuf,
    pub drive_dir: PathBuf,
}

/// One idempotent schema-upgrade step.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    /// Name used in failure reports.
    fn name(&self) -> &'static str;

    /// Whether this step must run to bring `version` up to date.
    fn applies_to(&self, version: Option<&str>) -> bool;

    async fn run(&self, ctx: &MigrationContext) -> Result<()>;
}

/// Ordered registry of migration steps.
pub struct MigrationRunner {
    steps: Vec<Arc<dyn MigrationStep>>,
}

impl MigrationRunner {
    pub fn new(steps: Vec<Arc<dyn MigrationStep>>) -> Self {
        Self { steps }
    }

    /// Runner carrying the built-in upgrade steps.
    pub fn with_default_steps() -> Self {
        Self::new(vec![Arc::new(RelocateSecretFiles)])
    }

    /// Run every step that applies to the stored version, in order. Returns
    /// the number of steps run; a failing step aborts with
    /// `LoginError::Migration`.
    pub async fn run_pending(
        &self,
        version: Option<&str>,
        ctx: &MigrationContext,
    ) -> Result<u32> {
        let mut ran = 0u32;
        for step in &self.steps {
            if !step.applies_to(version) {
                continue;
            }
            info!(step = step.name(), from_version = ?version, "Running schema migration");
            step.run(ctx).await.map_err(|e| LoginError::Migration {
                step: step.name().to_string(),
                reason: e.to_string(),
            })?;
            ran += 1;
        }
        Ok(ran)
    }
}

/// Pre-2.0 layouts kept the vault/recovery files beside the device-info
/// file; the current layout keeps them inside the drive directory.
struct RelocateSecretFiles;

#[async_trait]
impl MigrationStep for RelocateSecretFiles {
    fn name(&self) -> &'static str {
        "relocate-secret-files"
    }

    fn applies_to(&self, version: Option<&str>) -> bool {
        matches!(version, None | Some("1.0"))
    }

    async fn run(&self, ctx: &MigrationContext) -> Result<()> {
        for name in ["vault", "recovery"] {
            let legacy = ctx.account_dir.join(name);
            if tokio::fs::try_exists(&legacy).await? {
                tokio::fs::create_dir_all(&ctx.drive_dir).await?;
                tokio::fs::rename(&legacy, ctx.drive_dir.join(name)).await?;
            }
        }
        Ok(())
    }
}
