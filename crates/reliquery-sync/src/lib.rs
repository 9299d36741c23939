//! HR → IT roster reconciliation: archive, harmonize, reconcile, sort, repaint.

use serde::Serialize;

pub mod archive;
pub mod colorize;
pub mod config;
pub mod harmonize;
pub mod pipeline;
pub mod reconcile;

pub use archive::archive_stale;
pub use colorize::{repair_colors, CohortTally};
pub use config::{ConfigError, SheetBinding, SheetLayout, SyncConfig};
pub use harmonize::harmonize_dates;
pub use pipeline::{BoundSheet, SyncError, SyncPipeline, SyncRunSummary};
pub use reconcile::{reconcile, ReconcileOutcome};

pub const CRATE_NAME: &str = "reliquery-sync";

/// Result of a best-effort per-row loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub applied: usize,
    pub failed: usize,
}

pub async fn run_sync_once_from_env(api_key: String) -> anyhow::Result<SyncRunSummary> {
    let config = SyncConfig::from_env();
    let pipeline = SyncPipeline::from_config(&config, api_key)?;
    Ok(pipeline.run_once().await?)
}
