use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Local, NaiveDate, Utc};
use reliquery_adapters::{
    authoritative_records, derived_views, upcoming_records, ColumnMap, SheetError, SheetRow,
    SheetSource, SmartsheetAdapter,
};
use reliquery_core::SheetId;
use reliquery_storage::{ApiClient, ColorAssigner, FileColorStateStore, HttpClientConfig};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use crate::archive::archive_stale;
use crate::colorize::repair_colors;
use crate::config::{SheetLayout, SyncConfig};
use crate::harmonize::harmonize_dates;
use crate::reconcile::reconcile;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("could not load the {role} sheet {sheet_id}: {source}")]
    SourceUnavailable {
        role: &'static str,
        sheet_id: SheetId,
        #[source]
        source: SheetError,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub run_date: NaiveDate,
    pub authoritative_records: usize,
    pub derived_records: usize,
    pub archived: usize,
    pub dates_harmonized: usize,
    pub created: usize,
    pub deleted: usize,
    pub colors_repaired: usize,
    pub failed_calls: usize,
    pub skipped_steps: Vec<String>,
}

/// One sheet plus the column layout used to read it.
#[derive(Clone)]
pub struct BoundSheet {
    pub source: Arc<dyn SheetSource>,
    pub columns: ColumnMap,
}

impl BoundSheet {
    pub fn new(source: Arc<dyn SheetSource>, columns: ColumnMap) -> Self {
        Self { source, columns }
    }
}

/// Runs the reconciliation steps in order, once per invocation.
pub struct SyncPipeline {
    authoritative: BoundSheet,
    derived: BoundSheet,
    archive_sheet_id: SheetId,
    assigner: ColorAssigner,
}

impl SyncPipeline {
    pub fn new(
        authoritative: BoundSheet,
        derived: BoundSheet,
        archive_sheet_id: SheetId,
        assigner: ColorAssigner,
    ) -> Self {
        Self {
            authoritative,
            derived,
            archive_sheet_id,
            assigner,
        }
    }

    /// Wires Smartsheet adapters and the file-backed color state from config.
    pub fn from_config(config: &SyncConfig, api_key: String) -> anyhow::Result<Self> {
        let layout = SheetLayout::load(&config.layout_path)
            .with_context(|| format!("loading sheet layout {}", config.layout_path.display()))?;
        let palette = layout.palette()?;
        let http = ApiClient::new(HttpClientConfig {
            base_url: config.api_base.clone(),
            api_key,
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;

        let authoritative = BoundSheet::new(
            Arc::new(SmartsheetAdapter::new(http.clone(), layout.authoritative.sheet_id)),
            layout.authoritative.columns,
        );
        let derived = BoundSheet::new(
            Arc::new(SmartsheetAdapter::new(http, layout.derived.sheet_id)),
            layout.derived.columns,
        );
        let store = FileColorStateStore::new(config.color_state_path.clone());
        Ok(Self::new(
            authoritative,
            derived,
            layout.archive_sheet_id,
            ColorAssigner::new(Arc::new(store), palette),
        ))
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary, SyncError> {
        self.run_once_at(Local::now().date_naive()).await
    }

    pub async fn run_once_at(&self, today: NaiveDate) -> Result<SyncRunSummary, SyncError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("sync_run", %run_id, %today);
        self.run_steps(run_id, today).instrument(span).await
    }

    async fn run_steps(&self, run_id: Uuid, today: NaiveDate) -> Result<SyncRunSummary, SyncError> {
        let started_at = Utc::now();
        let hr = self.authoritative.source.as_ref();
        let it = self.derived.source.as_ref();
        let it_columns = &self.derived.columns;

        let hr_rows = hr.fetch_all(false).await;
        let it_rows = it.fetch_all(false).await;
        let hr_rows = hr_rows.map_err(|source| SyncError::SourceUnavailable {
            role: "authoritative",
            sheet_id: hr.sheet_id(),
            source,
        })?;
        let it_rows = it_rows.map_err(|source| SyncError::SourceUnavailable {
            role: "derived",
            sheet_id: it.sheet_id(),
            source,
        })?;

        let authoritative = authoritative_records(&hr_rows, &self.authoritative.columns, today);
        let views = derived_views(&it_rows, it_columns, today);
        info!(
            authoritative = authoritative.len(),
            derived = views.valid.len(),
            stale = views.stale.len(),
            "loaded both sheets"
        );

        let mut skipped_steps = Vec::new();
        let mut failed_calls = 0;

        let archived = archive_stale(it, &views.stale, self.archive_sheet_id).await;
        failed_calls += archived.failed;

        let harmonized = harmonize_dates(it, it_columns, &authoritative, &views.valid).await;
        failed_calls += harmonized.failed;

        let reconciled = match self.reload_derived().await {
            Some(rows) => {
                let derived = derived_views(&rows, it_columns, today).valid;
                reconcile(it, it_columns, &self.assigner, &authoritative, &derived).await
            }
            None => {
                skipped_steps.push("reconcile".to_string());
                Default::default()
            }
        };
        failed_calls += reconciled.failed;

        if let Err(err) = it.reorder(&it_columns.roster_sort()).await {
            error!(error = %err, "sorting derived sheet failed");
            failed_calls += 1;
        }

        let mut colors_repaired = 0;
        match self.reload_derived().await {
            Some(rows) => {
                // Duplicate keys are repainted along with the rest of their cohort.
                let records = upcoming_records(&rows, it_columns, today);
                match repair_colors(it, it_columns, &records).await {
                    Ok(outcome) => {
                        colors_repaired = outcome.applied;
                        failed_calls += outcome.failed;
                    }
                    Err(err) => {
                        error!(error = %err, "reading derived colors failed; skipping color repair");
                        skipped_steps.push("colorize".to_string());
                    }
                }
            }
            None => skipped_steps.push("colorize".to_string()),
        }

        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            run_date: today,
            authoritative_records: authoritative.len(),
            derived_records: views.valid.len(),
            archived: archived.applied,
            dates_harmonized: harmonized.applied,
            created: reconciled.created,
            deleted: reconciled.deleted,
            colors_repaired,
            failed_calls,
            skipped_steps,
        };
        info!(
            archived = summary.archived,
            harmonized = summary.dates_harmonized,
            created = summary.created,
            deleted = summary.deleted,
            repainted = summary.colors_repaired,
            failed = summary.failed_calls,
            "sync run finished"
        );
        Ok(summary)
    }

    async fn reload_derived(&self) -> Option<Vec<SheetRow>> {
        match self.derived.source.fetch_all(false).await {
            Ok(rows) => Some(rows),
            Err(err) => {
                error!(error = %err, "re-reading derived sheet failed");
                None
            }
        }
    }
}
