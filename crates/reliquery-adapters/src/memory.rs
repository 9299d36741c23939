//! In-process `SheetSource` that records every call, for exercising the sync steps.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use reliquery_core::{ColumnId, RowId, SheetId};
use serde_json::Value as JsonValue;

use crate::{Cell, RowPayload, SheetError, SheetRow, SheetSource, SortCriterion, SortDirection};

const FIRST_ROW_ID: i64 = 1_000;

/// One attempted operation, recorded whether or not it succeeded.
#[derive(Debug, Clone, PartialEq)]
pub enum SheetCall {
    FetchAll { include_format: bool },
    FetchOne(RowId),
    Create(RowPayload),
    Update(RowId, RowPayload),
    Delete(RowId),
    Relocate(RowId, SheetId),
    Reorder(Vec<SortCriterion>),
}

#[derive(Debug)]
pub struct InMemorySheet {
    sheet_id: SheetId,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    rows: Vec<SheetRow>,
    next_row_id: i64,
    calls: Vec<SheetCall>,
    relocated: Vec<(SheetId, SheetRow)>,
    unavailable: bool,
    failing_rows: HashSet<RowId>,
}

impl InMemorySheet {
    pub fn new(sheet_id: SheetId) -> Self {
        Self::with_rows(sheet_id, Vec::new())
    }

    pub fn with_rows(sheet_id: SheetId, rows: Vec<SheetRow>) -> Self {
        let next_row_id = rows
            .iter()
            .map(|r| r.id.0 + 1)
            .max()
            .unwrap_or(FIRST_ROW_ID)
            .max(FIRST_ROW_ID);
        Self {
            sheet_id,
            inner: Mutex::new(Inner {
                rows,
                next_row_id,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn rows(&self) -> Vec<SheetRow> {
        self.lock().rows.clone()
    }

    pub fn calls(&self) -> Vec<SheetCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, matches: impl Fn(&SheetCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| matches(c)).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Rows moved out of this sheet, with their destination.
    pub fn relocated(&self) -> Vec<(SheetId, SheetRow)> {
        self.lock().relocated.clone()
    }

    /// Makes every subsequent call fail as if the sheet could not be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Makes every row-targeted call on `row_id` fail.
    pub fn fail_row(&self, row_id: RowId) {
        self.lock().failing_rows.insert(row_id);
    }

    fn begin(&self, call: SheetCall, row_id: Option<RowId>) -> Result<MutexGuard<'_, Inner>, SheetError> {
        let mut inner = self.lock();
        inner.calls.push(call);
        if inner.unavailable {
            return Err(SheetError::Unavailable(self.sheet_id));
        }
        if let Some(row_id) = row_id {
            if inner.failing_rows.contains(&row_id) {
                return Err(SheetError::Message(format!("injected failure for row {row_id}")));
            }
        }
        Ok(inner)
    }

    fn not_found(&self, row_id: RowId) -> SheetError {
        SheetError::RowNotFound {
            sheet_id: self.sheet_id,
            row_id,
        }
    }
}

fn stored_value(value: &JsonValue) -> Option<JsonValue> {
    match value {
        JsonValue::Null => None,
        other => Some(other.clone()),
    }
}

fn without_formats(mut row: SheetRow) -> SheetRow {
    for cell in &mut row.cells {
        cell.format = None;
    }
    row
}

fn sort_text(row: &SheetRow, column: ColumnId) -> String {
    row.text(column).unwrap_or_default()
}

fn compare_rows(a: &SheetRow, b: &SheetRow, criteria: &[SortCriterion]) -> Ordering {
    for criterion in criteria {
        let ordering = sort_text(a, criterion.column_id).cmp(&sort_text(b, criterion.column_id));
        let ordering = match criterion.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl SheetSource for InMemorySheet {
    fn sheet_id(&self) -> SheetId {
        self.sheet_id
    }

    async fn fetch_all(&self, include_format: bool) -> Result<Vec<SheetRow>, SheetError> {
        let inner = self.begin(SheetCall::FetchAll { include_format }, None)?;
        let rows = inner.rows.clone();
        if include_format {
            Ok(rows)
        } else {
            Ok(rows.into_iter().map(without_formats).collect())
        }
    }

    async fn fetch_one(&self, row_id: RowId) -> Result<SheetRow, SheetError> {
        let inner = self.begin(SheetCall::FetchOne(row_id), Some(row_id))?;
        inner
            .rows
            .iter()
            .find(|r| r.id == row_id)
            .cloned()
            .map(without_formats)
            .ok_or_else(|| self.not_found(row_id))
    }

    async fn create(&self, row: &RowPayload) -> Result<(), SheetError> {
        let mut inner = self.begin(SheetCall::Create(row.clone()), None)?;
        let id = RowId(inner.next_row_id);
        inner.next_row_id += 1;
        let cells = row
            .cells
            .iter()
            .map(|c| Cell {
                column_id: c.column_id,
                value: stored_value(&c.value),
                format: c.format.clone().or_else(|| row.format.clone()),
            })
            .collect();
        inner.rows.push(SheetRow { id, cells });
        Ok(())
    }

    async fn update(&self, row_id: RowId, row: &RowPayload) -> Result<(), SheetError> {
        let mut inner = self.begin(SheetCall::Update(row_id, row.clone()), Some(row_id))?;
        let Some(target) = inner.rows.iter_mut().find(|r| r.id == row_id) else {
            return Err(self.not_found(row_id));
        };
        for write in &row.cells {
            let format = write.format.clone().or_else(|| row.format.clone());
            match target.cells.iter_mut().find(|c| c.column_id == write.column_id) {
                Some(cell) => {
                    cell.value = stored_value(&write.value);
                    if format.is_some() {
                        cell.format = format;
                    }
                }
                None => target.cells.push(Cell {
                    column_id: write.column_id,
                    value: stored_value(&write.value),
                    format,
                }),
            }
        }
        Ok(())
    }

    async fn delete(&self, row_id: RowId) -> Result<(), SheetError> {
        let mut inner = self.begin(SheetCall::Delete(row_id), Some(row_id))?;
        let before = inner.rows.len();
        inner.rows.retain(|r| r.id != row_id);
        if inner.rows.len() == before {
            return Err(self.not_found(row_id));
        }
        Ok(())
    }

    async fn relocate(&self, row_id: RowId, destination: SheetId) -> Result<(), SheetError> {
        let mut inner = self.begin(SheetCall::Relocate(row_id, destination), Some(row_id))?;
        let Some(index) = inner.rows.iter().position(|r| r.id == row_id) else {
            return Err(self.not_found(row_id));
        };
        let row = inner.rows.remove(index);
        inner.relocated.push((destination, row));
        Ok(())
    }

    async fn reorder(&self, criteria: &[SortCriterion]) -> Result<(), SheetError> {
        let mut inner = self.begin(SheetCall::Reorder(criteria.to_vec()), None)?;
        inner.rows.sort_by(|a, b| compare_rows(a, b, criteria));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CellWrite;
    use serde_json::json;

    fn payload(date: &str, email: &str, format: Option<&str>) -> RowPayload {
        RowPayload {
            format: format.map(str::to_string),
            cells: vec![
                CellWrite::value(ColumnId(1), date),
                CellWrite::value(ColumnId(6), email),
            ],
        }
    }

    #[tokio::test]
    async fn create_applies_row_format_to_cells_and_fetch_can_hide_it() {
        let sheet = InMemorySheet::new(SheetId(1));
        sheet
            .create(&payload("2099-01-01", "a@x.com", Some(",,,,,,2,,,5,,,,,,")))
            .await
            .expect("create");

        let with_format = sheet.fetch_all(true).await.expect("fetch");
        assert_eq!(with_format.len(), 1);
        assert_eq!(with_format[0].id, RowId(FIRST_ROW_ID));
        assert_eq!(with_format[0].format(ColumnId(6)), Some(",,,,,,2,,,5,,,,,,"));

        let plain = sheet.fetch_all(false).await.expect("fetch");
        assert_eq!(plain[0].format(ColumnId(6)), None);
        assert_eq!(plain[0].text(ColumnId(6)).as_deref(), Some("a@x.com"));
    }

    #[tokio::test]
    async fn update_merges_cells_and_keeps_untouched_formats() {
        let sheet = InMemorySheet::new(SheetId(1));
        sheet
            .create(&payload("2099-01-01", "a@x.com", Some("f")))
            .await
            .expect("create");
        let row_id = RowId(FIRST_ROW_ID);
        sheet
            .update(
                row_id,
                &RowPayload {
                    format: None,
                    cells: vec![CellWrite::value(ColumnId(1), json!("2099-02-02"))],
                },
            )
            .await
            .expect("update");

        let row = &sheet.fetch_all(true).await.expect("fetch")[0];
        assert_eq!(row.text(ColumnId(1)).as_deref(), Some("2099-02-02"));
        assert_eq!(row.format(ColumnId(1)), Some("f"));
    }

    #[tokio::test]
    async fn failures_are_recorded_as_attempts() {
        let sheet = InMemorySheet::new(SheetId(1));
        sheet.fail_row(RowId(5));
        assert!(sheet.delete(RowId(5)).await.is_err());
        assert!(matches!(
            sheet.delete(RowId(6)).await,
            Err(SheetError::RowNotFound { .. })
        ));
        sheet.set_unavailable(true);
        assert!(matches!(
            sheet.fetch_all(false).await,
            Err(SheetError::Unavailable(SheetId(1)))
        ));
        assert_eq!(sheet.calls().len(), 3);
    }

    #[tokio::test]
    async fn reorder_sorts_by_each_criterion_in_turn() {
        let sheet = InMemorySheet::new(SheetId(1));
        for (date, email) in [
            ("2099-01-01", "b@x.com"),
            ("2099-03-01", "c@x.com"),
            ("2099-01-01", "a@x.com"),
        ] {
            sheet.create(&payload(date, email, None)).await.expect("create");
        }
        let criteria = [
            SortCriterion {
                column_id: ColumnId(1),
                direction: SortDirection::Descending,
            },
            SortCriterion {
                column_id: ColumnId(6),
                direction: SortDirection::Ascending,
            },
        ];
        sheet.reorder(&criteria).await.expect("reorder");
        let emails: Vec<_> = sheet
            .rows()
            .iter()
            .filter_map(|r| r.text(ColumnId(6)))
            .collect();
        assert_eq!(emails, vec!["c@x.com", "a@x.com", "b@x.com"]);
    }
}
