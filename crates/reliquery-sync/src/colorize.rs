//! Majority-vote repair of cohort colors on the derived sheet.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use reliquery_adapters::{normalize_row, CellWrite, ColumnMap, RowPayload, SheetError, SheetSource};
use reliquery_core::{cohort_format, color_from_format, CohortColor, Record, RowId};
use serde_json::Value as JsonValue;
use tracing::{debug, error};

use crate::StepOutcome;

/// Per-cohort color histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CohortTally {
    counts: BTreeMap<NaiveDate, BTreeMap<CohortColor, usize>>,
}

impl CohortTally {
    pub fn record(&mut self, hire_date: NaiveDate, color: CohortColor) {
        *self
            .counts
            .entry(hire_date)
            .or_default()
            .entry(color)
            .or_default() += 1;
    }

    /// Most frequent color of the cohort. Ties go to the lowest color code.
    pub fn majority(&self, hire_date: NaiveDate) -> Option<CohortColor> {
        self.counts
            .get(&hire_date)?
            .iter()
            .max_by(|(a_color, a_count), (b_color, b_count)| {
                a_count.cmp(b_count).then(b_color.cmp(a_color))
            })
            .map(|(&color, _)| color)
    }
}

/// Repaints every record whose displayed color differs from its cohort majority.
///
/// Colors are read from a separate format-inclusive fetch; the histogram covers
/// every keyed row in that fetch. Each repair re-reads its row so cell values
/// are written back unchanged. Errors only when that fetch fails.
pub async fn repair_colors(
    sheet: &dyn SheetSource,
    columns: &ColumnMap,
    records: &[Record],
) -> Result<StepOutcome, SheetError> {
    let rows = sheet.fetch_all(true).await?;

    let mut tally = CohortTally::default();
    let mut displayed: HashMap<RowId, Option<CohortColor>> = HashMap::new();
    for row in &rows {
        let Some(record) = normalize_row(row, columns, true) else {
            continue;
        };
        let color = row.format(columns.hire_date).and_then(color_from_format);
        if let Some(color) = color {
            tally.record(record.hire_date, color);
        }
        displayed.insert(row.id, color);
    }

    let mut outcome = StepOutcome::default();
    for record in records {
        let Some(row_id) = record.row_id else {
            continue;
        };
        let Some(current) = displayed.get(&row_id).copied() else {
            debug!(%row_id, "row missing from format fetch; not repainting");
            continue;
        };
        let Some(majority) = tally.majority(record.hire_date) else {
            continue;
        };
        if current == Some(majority) {
            continue;
        }

        match repaint_row(sheet, row_id, majority).await {
            Ok(()) => {
                debug!(%row_id, hire_date = %record.hire_date, from = ?current, to = %majority, "repainted row");
                outcome.applied += 1;
            }
            Err(err) => {
                error!(%row_id, error = %err, "repainting row failed");
                outcome.failed += 1;
            }
        }
    }
    Ok(outcome)
}

async fn repaint_row(sheet: &dyn SheetSource, row_id: RowId, color: CohortColor) -> Result<(), SheetError> {
    let row = sheet.fetch_one(row_id).await?;
    let format = cohort_format(color);
    let cells = row
        .cells
        .into_iter()
        .map(|cell| CellWrite {
            column_id: cell.column_id,
            value: cell.value.unwrap_or_else(|| JsonValue::String(String::new())),
            format: Some(format.clone()),
            strict: Some(false),
        })
        .collect();
    sheet.update(row_id, &RowPayload { format: None, cells }).await
}
