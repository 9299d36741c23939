//! Raw sheet rows → validated roster records.

use std::collections::HashSet;

use chrono::NaiveDate;
use reliquery_core::{parse_hire_date, Freshness, Record};
use tracing::warn;

use crate::{ColumnMap, SheetRow};

/// The two views taken of the derived sheet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedViews {
    /// Hire date still ahead of today.
    pub valid: Vec<Record>,
    /// Hire date past the archive threshold.
    pub stale: Vec<Record>,
}

/// Builds a record from a row, or `None` when the key or hire date is missing.
pub fn normalize_row(row: &SheetRow, columns: &ColumnMap, with_row_id: bool) -> Option<Record> {
    let personal_email = row.text(columns.personal_email)?;
    let hire_date = row.text(columns.hire_date).as_deref().and_then(hire_date_from_text)?;
    Some(Record {
        hire_date,
        first_name: row.text(columns.first_name),
        last_name: row.text(columns.last_name),
        title: row.text(columns.title),
        office: row.text(columns.office),
        personal_email,
        row_id: with_row_id.then_some(row.id),
    })
}

/// Authoritative records with a hire date strictly after `today`.
pub fn authoritative_records(rows: &[SheetRow], columns: &ColumnMap, today: NaiveDate) -> Vec<Record> {
    let upcoming = rows
        .iter()
        .filter_map(|row| normalize_row(row, columns, false))
        .filter(|record| record.freshness(today) == Freshness::Upcoming);
    first_per_email(upcoming, "authoritative")
}

/// Splits derived rows into upcoming and stale records. Rows inside the grace
/// window end up in neither.
pub fn derived_views(rows: &[SheetRow], columns: &ColumnMap, today: NaiveDate) -> DerivedViews {
    let mut upcoming = Vec::new();
    let mut stale = Vec::new();
    for record in rows.iter().filter_map(|row| normalize_row(row, columns, true)) {
        match record.freshness(today) {
            Freshness::Upcoming => upcoming.push(record),
            Freshness::Stale => stale.push(record),
            Freshness::GracePeriod => {}
        }
    }
    DerivedViews {
        valid: first_per_email(upcoming, "derived"),
        stale,
    }
}

/// Every upcoming derived record with its row id, duplicate keys included.
pub fn upcoming_records(rows: &[SheetRow], columns: &ColumnMap, today: NaiveDate) -> Vec<Record> {
    rows.iter()
        .filter_map(|row| normalize_row(row, columns, true))
        .filter(|record| record.freshness(today) == Freshness::Upcoming)
        .collect()
}

fn hire_date_from_text(text: &str) -> Option<NaiveDate> {
    // Date columns may come back with a time suffix.
    parse_hire_date(text).or_else(|| text.get(..10).and_then(parse_hire_date))
}

fn first_per_email(records: impl IntoIterator<Item = Record>, view: &str) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let fresh = seen.insert(record.personal_email.clone());
            if !fresh {
                warn!(
                    view,
                    personal_email = %record.personal_email,
                    row_id = ?record.row_id,
                    "duplicate key; keeping the first row"
                );
            }
            fresh
        })
        .collect()
}
