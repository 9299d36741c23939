use reliquery_adapters::SheetSource;
use reliquery_core::{Record, SheetId};
use tracing::{debug, error};

use crate::StepOutcome;

/// Moves each stale derived row into the archive sheet. Best effort: a failed
/// move is logged and the remaining rows are still attempted.
pub async fn archive_stale(sheet: &dyn SheetSource, stale: &[Record], destination: SheetId) -> StepOutcome {
    let mut outcome = StepOutcome::default();
    for record in stale {
        let Some(row_id) = record.row_id else {
            debug!(personal_email = %record.personal_email, "stale record has no row id; skipping");
            continue;
        };
        match sheet.relocate(row_id, destination).await {
            Ok(()) => {
                debug!(%row_id, %destination, hire_date = %record.hire_date, "archived row");
                outcome.applied += 1;
            }
            Err(err) => {
                error!(%row_id, %destination, error = %err, "archiving row failed");
                outcome.failed += 1;
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use reliquery_adapters::{Cell, InMemorySheet, SheetCall, SheetRow};
    use reliquery_core::{ColumnId, RowId};
    use serde_json::json;

    fn stale(row_id: i64) -> Record {
        Record {
            hire_date: NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"),
            first_name: None,
            last_name: None,
            title: None,
            office: None,
            personal_email: format!("{row_id}@x.com"),
            row_id: Some(RowId(row_id)),
        }
    }

    fn sheet_row(id: i64) -> SheetRow {
        SheetRow {
            id: RowId(id),
            cells: vec![Cell {
                column_id: ColumnId(6),
                value: Some(json!(format!("{id}@x.com"))),
                format: None,
            }],
        }
    }

    #[tokio::test]
    async fn one_failed_move_does_not_stop_the_rest() {
        let sheet = InMemorySheet::with_rows(SheetId(1), vec![sheet_row(1), sheet_row(2), sheet_row(3)]);
        sheet.fail_row(RowId(2));

        let outcome = archive_stale(&sheet, &[stale(1), stale(2), stale(3)], SheetId(99)).await;

        assert_eq!(outcome, StepOutcome { applied: 2, failed: 1 });
        assert_eq!(
            sheet.count_calls(|c| matches!(c, SheetCall::Relocate(_, SheetId(99)))),
            3
        );
        let moved: Vec<_> = sheet.relocated().into_iter().map(|(_, row)| row.id).collect();
        assert_eq!(moved, vec![RowId(1), RowId(3)]);
        assert_eq!(sheet.rows().len(), 1);
    }
}
