use std::collections::HashMap;

use reliquery_adapters::{CellWrite, ColumnMap, RowPayload, SheetSource};
use reliquery_core::Record;
use tracing::{debug, error};

use crate::StepOutcome;

/// Overwrites the hire date of every derived row whose key also appears in the
/// authoritative set with a different date. Rows that already agree are not touched.
pub async fn harmonize_dates(
    sheet: &dyn SheetSource,
    columns: &ColumnMap,
    authoritative: &[Record],
    derived: &[Record],
) -> StepOutcome {
    let by_email: HashMap<&str, &Record> = authoritative
        .iter()
        .map(|r| (r.personal_email.as_str(), r))
        .collect();

    let mut outcome = StepOutcome::default();
    for record in derived {
        let Some(source) = by_email.get(record.personal_email.as_str()) else {
            continue;
        };
        if source.hire_date == record.hire_date {
            continue;
        }
        let Some(row_id) = record.row_id else {
            continue;
        };

        let payload = RowPayload {
            format: None,
            cells: vec![CellWrite::value(columns.hire_date, source.hire_date_text())],
        };
        match sheet.update(row_id, &payload).await {
            Ok(()) => {
                debug!(
                    %row_id,
                    from = %record.hire_date,
                    to = %source.hire_date,
                    "hire date taken from authoritative sheet"
                );
                outcome.applied += 1;
            }
            Err(err) => {
                error!(%row_id, error = %err, "updating hire date failed");
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
    use reliquery_adapters::{normalize_row, InMemorySheet, SheetCall};
    use reliquery_core::{ColumnId, RowId, SheetId};

    fn columns() -> ColumnMap {
        ColumnMap {
            hire_date: ColumnId(1),
            first_name: ColumnId(2),
            last_name: ColumnId(3),
            title: ColumnId(4),
            office: ColumnId(5),
            personal_email: ColumnId(6),
        }
    }

    fn record(email: &str, date: &str) -> Record {
        Record {
            hire_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("date"),
            first_name: None,
            last_name: None,
            title: None,
            office: None,
            personal_email: email.to_string(),
            row_id: None,
        }
    }

    async fn derived_sheet(rows: &[(&str, &str)]) -> (InMemorySheet, Vec<Record>) {
        let sheet = InMemorySheet::new(SheetId(2));
        for (email, date) in rows {
            let payload = RowPayload {
                format: None,
                cells: columns().record_cells(&record(email, date)),
            };
            sheet.create(&payload).await.expect("seed");
        }
        let records = read_back(&sheet).await;
        sheet.clear_calls();
        (sheet, records)
    }

    async fn read_back(sheet: &InMemorySheet) -> Vec<Record> {
        sheet
            .fetch_all(false)
            .await
            .expect("fetch")
            .iter()
            .filter_map(|r| normalize_row(r, &columns(), true))
            .collect()
    }

    #[tokio::test]
    async fn authoritative_date_wins_and_second_pass_is_a_no_op() {
        let (sheet, derived) =
            derived_sheet(&[("a@x.com", "2099-01-01"), ("b@x.com", "2099-05-05"), ("c@x.com", "2099-07-07")]).await;
        let hr = vec![
            record("a@x.com", "2099-02-01"),
            record("b@x.com", "2099-05-05"),
            record("z@x.com", "2099-09-09"),
        ];

        let first = harmonize_dates(&sheet, &columns(), &hr, &derived).await;
        assert_eq!(first, StepOutcome { applied: 1, failed: 0 });

        let after = read_back(&sheet).await;
        let a = after.iter().find(|r| r.personal_email == "a@x.com").expect("a");
        assert_eq!(a.hire_date_text(), "2099-02-01");
        assert_eq!(a.row_id, derived[0].row_id);

        sheet.clear_calls();
        let second = harmonize_dates(&sheet, &columns(), &hr, &after).await;
        assert_eq!(second, StepOutcome::default());
        assert_eq!(sheet.count_calls(|c| matches!(c, SheetCall::Update(..))), 0);
    }

    #[tokio::test]
    async fn update_failure_is_counted() {
        let (sheet, derived) = derived_sheet(&[("a@x.com", "2099-01-01")]).await;
        sheet.fail_row(derived[0].row_id.unwrap_or(RowId(0)));
        let hr = vec![record("a@x.com", "2099-03-01")];
        let outcome = harmonize_dates(&sheet, &columns(), &hr, &derived).await;
        assert_eq!(outcome, StepOutcome { applied: 0, failed: 1 });
    }
}
