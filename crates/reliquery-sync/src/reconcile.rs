use std::collections::HashSet;

use reliquery_adapters::{ColumnMap, RowPayload, SheetSource};
use reliquery_core::{cohort_format, Record};
use reliquery_storage::ColorAssigner;
use serde::Serialize;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Converges the derived key set onto the authoritative one.
///
/// Derived rows with no authoritative counterpart are deleted. Authoritative
/// records missing from the derived sheet are created in authoritative order,
/// each painted with the color `assigner` decides for its hire date.
pub async fn reconcile(
    sheet: &dyn SheetSource,
    columns: &ColumnMap,
    assigner: &ColorAssigner,
    authoritative: &[Record],
    derived: &[Record],
) -> ReconcileOutcome {
    let authoritative_keys: HashSet<&str> = authoritative
        .iter()
        .map(|r| r.personal_email.as_str())
        .collect();
    let derived_keys: HashSet<&str> = derived.iter().map(|r| r.personal_email.as_str()).collect();

    let mut outcome = ReconcileOutcome::default();

    for record in derived
        .iter()
        .filter(|r| !authoritative_keys.contains(r.personal_email.as_str()))
    {
        let Some(row_id) = record.row_id else {
            continue;
        };
        match sheet.delete(row_id).await {
            Ok(()) => {
                info!(%row_id, personal_email = %record.personal_email, "removed row absent from authoritative sheet");
                outcome.deleted += 1;
            }
            Err(err) => {
                error!(%row_id, error = %err, "deleting row failed");
                outcome.failed += 1;
            }
        }
    }

    for record in authoritative
        .iter()
        .filter(|r| !derived_keys.contains(r.personal_email.as_str()))
    {
        let color = match assigner.decide_color(record.hire_date).await {
            Ok(color) => color,
            Err(err) => {
                error!(personal_email = %record.personal_email, error = %err, "no color decision; skipping create");
                outcome.failed += 1;
                continue;
            }
        };
        let payload = RowPayload {
            format: Some(cohort_format(color)),
            cells: columns.record_cells(record),
        };
        match sheet.create(&payload).await {
            Ok(()) => {
                debug!(personal_email = %record.personal_email, hire_date = %record.hire_date, %color, "created row");
                outcome.created += 1;
            }
            Err(err) => {
                error!(personal_email = %record.personal_email, error = %err, "creating row failed");
                outcome.failed += 1;
            }
        }
    }

    outcome
}
