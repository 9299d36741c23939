//! Sheet source contract, wire types and row normalization.

use async_trait::async_trait;
use reliquery_core::{ColumnId, Record, RowId, SheetId};
use reliquery_storage::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

pub mod memory;
pub mod normalize;
pub mod smartsheet;

pub use memory::{InMemorySheet, SheetCall};
pub use normalize::{
    authoritative_records, derived_views, normalize_row, upcoming_records, DerivedViews,
};
pub use smartsheet::SmartsheetAdapter;

pub const CRATE_NAME: &str = "reliquery-adapters";

/// A row as returned by the sheet API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetRow {
    pub id: RowId,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub column_id: ColumnId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl SheetRow {
    pub fn cell(&self, column: ColumnId) -> Option<&Cell> {
        self.cells.iter().find(|c| c.column_id == column)
    }

    /// Trimmed text of a cell; blank and missing cells are `None`.
    pub fn text(&self, column: ColumnId) -> Option<String> {
        self.cell(column)
            .and_then(|c| c.value.as_ref())
            .and_then(value_text)
    }

    pub fn format(&self, column: ColumnId) -> Option<&str> {
        self.cell(column).and_then(|c| c.format.as_deref())
    }
}

fn value_text(value: &JsonValue) -> Option<String> {
    let text = match value {
        JsonValue::String(s) => s.trim().to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Body of a create or update request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPayload {
    /// Row-level format, applied to every cell that has none of its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub cells: Vec<CellWrite>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellWrite {
    pub column_id: ColumnId,
    pub value: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

impl CellWrite {
    pub fn value(column_id: ColumnId, value: impl Into<JsonValue>) -> Self {
        Self {
            column_id,
            value: value.into(),
            format: None,
            strict: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortCriterion {
    pub column_id: ColumnId,
    pub direction: SortDirection,
}

/// Column ids of the roster fields within one sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub hire_date: ColumnId,
    pub first_name: ColumnId,
    pub last_name: ColumnId,
    pub title: ColumnId,
    pub office: ColumnId,
    pub personal_email: ColumnId,
}

impl ColumnMap {
    /// Value cells for a new row copied from `record`; absent fields are omitted.
    pub fn record_cells(&self, record: &Record) -> Vec<CellWrite> {
        let mut cells = vec![CellWrite::value(self.hire_date, record.hire_date_text())];
        let optional = [
            (self.first_name, &record.first_name),
            (self.last_name, &record.last_name),
            (self.title, &record.title),
            (self.office, &record.office),
        ];
        for (column, value) in optional {
            if let Some(value) = value {
                cells.push(CellWrite::value(column, value.clone()));
            }
        }
        cells.push(CellWrite::value(self.personal_email, record.personal_email.clone()));
        cells
    }

    /// Newest cohorts first, then title descending, then first name.
    pub fn roster_sort(&self) -> Vec<SortCriterion> {
        vec![
            SortCriterion {
                column_id: self.hire_date,
                direction: SortDirection::Descending,
            },
            SortCriterion {
                column_id: self.title,
                direction: SortDirection::Descending,
            },
            SortCriterion {
                column_id: self.first_name,
                direction: SortDirection::Ascending,
            },
        ]
    }
}

#[derive(Debug, Error)]
pub enum SheetError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("sheet {0} is unavailable")]
    Unavailable(SheetId),
    #[error("row {row_id} not found in sheet {sheet_id}")]
    RowNotFound { sheet_id: SheetId, row_id: RowId },
    #[error("{0}")]
    Message(String),
}

/// Operations the reconciliation steps need from a sheet.
///
/// Every call is a single attempt; callers decide whether a failure skips a
/// step or aborts the run.
#[async_trait]
pub trait SheetSource: Send + Sync {
    fn sheet_id(&self) -> SheetId;

    async fn fetch_all(&self, include_format: bool) -> Result<Vec<SheetRow>, SheetError>;

    async fn fetch_one(&self, row_id: RowId) -> Result<SheetRow, SheetError>;

    async fn create(&self, row: &RowPayload) -> Result<(), SheetError>;

    async fn update(&self, row_id: RowId, row: &RowPayload) -> Result<(), SheetError>;

    async fn delete(&self, row_id: RowId) -> Result<(), SheetError>;

    /// Moves a row into another sheet, keeping its data.
    async fn relocate(&self, row_id: RowId, destination: SheetId) -> Result<(), SheetError>;

    async fn reorder(&self, criteria: &[SortCriterion]) -> Result<(), SheetError>;
}
