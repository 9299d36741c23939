//! Core roster model, cohort colors and the color-assignment cursor for Reliquery.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "reliquery-core";

/// Wire format for hire dates, both in sheet cells and in the color state file.
pub const HIRE_DATE_FORMAT: &str = "%Y-%m-%d";

/// Derived rows whose hire date is more than this many days old are archived.
pub const ARCHIVE_AFTER_DAYS: i64 = 3;

/// Number of comma-separated slots in a Smartsheet cell format descriptor.
pub const FORMAT_SLOTS: usize = 16;
pub const HORIZONTAL_ALIGN_SLOT: usize = 6;
pub const BACKGROUND_COLOR_SLOT: usize = 9;
const ALIGN_CENTER: &str = "2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SheetId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(pub i64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A normalized roster row. Authoritative (HR) records carry no row id; derived
/// (IT) records always do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub hire_date: NaiveDate,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    pub office: Option<String>,
    pub personal_email: String,
    pub row_id: Option<RowId>,
}

impl Record {
    pub fn hire_date_text(&self) -> String {
        format_hire_date(self.hire_date)
    }

    pub fn freshness(&self, today: NaiveDate) -> Freshness {
        Freshness::classify(self.hire_date, today)
    }
}

/// Where a hire date sits relative to the run date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freshness {
    /// Hire date is strictly after today.
    Upcoming,
    /// Today up to and including `ARCHIVE_AFTER_DAYS` days ago. Left untouched.
    GracePeriod,
    /// More than `ARCHIVE_AFTER_DAYS` days ago.
    Stale,
}

impl Freshness {
    pub fn classify(hire_date: NaiveDate, today: NaiveDate) -> Self {
        let age_days = (today - hire_date).num_days();
        if age_days < 0 {
            Freshness::Upcoming
        } else if age_days > ARCHIVE_AFTER_DAYS {
            Freshness::Stale
        } else {
            Freshness::GracePeriod
        }
    }
}

pub fn parse_hire_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), HIRE_DATE_FORMAT).ok()
}

pub fn format_hire_date(date: NaiveDate) -> String {
    date.format(HIRE_DATE_FORMAT).to_string()
}

/// Index into the sheet's color palette, as written in a cell format descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CohortColor(pub u32);

impl fmt::Display for CohortColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CohortColor {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(CohortColor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette([CohortColor; 3]);

impl Default for Palette {
    fn default() -> Self {
        Self([CohortColor(5), CohortColor(8), CohortColor(9)])
    }
}

impl Palette {
    pub fn new(colors: [CohortColor; 3]) -> Self {
        Self(colors)
    }

    pub fn color_at(&self, index: usize) -> CohortColor {
        self.0[index % self.0.len()]
    }

    pub fn colors(&self) -> &[CohortColor] {
        &self.0
    }
}

/// Format descriptor applied to every cell of a row painted with `color`:
/// centered text on a `color` background.
pub fn cohort_format(color: CohortColor) -> String {
    let mut slots = vec![String::new(); FORMAT_SLOTS];
    slots[HORIZONTAL_ALIGN_SLOT] = ALIGN_CENTER.to_string();
    slots[BACKGROUND_COLOR_SLOT] = color.to_string();
    slots.join(",")
}

/// Reads the background color slot of a cell format descriptor.
pub fn color_from_format(format: &str) -> Option<CohortColor> {
    let slot = format.split(',').nth(BACKGROUND_COLOR_SLOT)?.trim();
    if slot.is_empty() {
        return None;
    }
    slot.parse().ok()
}

/// Rotating cursor used to hand out a palette color to each newly created cohort.
///
/// Persisted as a single `index,last_seen,max_seen` line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorState {
    pub color_index: usize,
    pub last_seen_hire_date: Option<NaiveDate>,
    pub max_hire_date_seen: Option<NaiveDate>,
}

impl ColorState {
    /// Strict parse; `None` when the text is not a well-formed state line.
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text.trim().splitn(3, ',');
        let color_index = parts.next()?.trim().parse().ok()?;
        let last_seen_hire_date = parse_optional_date(parts.next()?)?;
        let max_hire_date_seen = parse_optional_date(parts.next()?)?;
        Some(Self {
            color_index,
            last_seen_hire_date,
            max_hire_date_seen,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{},{},{}",
            self.color_index,
            self.last_seen_hire_date.map(format_hire_date).unwrap_or_default(),
            self.max_hire_date_seen.map(format_hire_date).unwrap_or_default()
        )
    }

    /// Records a color decision for `hire_date` and returns the palette index to use.
    ///
    /// The index moves forward only when `hire_date` differs from the previous
    /// decision, so consecutive rows of one cohort share a color.
    pub fn observe(&mut self, hire_date: NaiveDate, palette_len: usize) -> usize {
        let palette_len = palette_len.max(1);
        self.color_index %= palette_len;
        if self.last_seen_hire_date != Some(hire_date) {
            self.last_seen_hire_date = Some(hire_date);
            self.color_index = (self.color_index + 1) % palette_len;
        }
        if !matches!(self.max_hire_date_seen, Some(max) if max >= hire_date) {
            self.max_hire_date_seen = Some(hire_date);
        }
        self.color_index
    }
}

// Outer None: malformed. Inner None: empty slot.
fn parse_optional_date(text: &str) -> Option<Option<NaiveDate>> {
    let text = text.trim();
    if text.is_empty() {
        return Some(None);
    }
    parse_hire_date(text).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        parse_hire_date(s).expect("valid date")
    }

    #[test]
    fn freshness_boundaries_leave_a_grace_window() {
        let today = day("2026-10-19");
        assert_eq!(Freshness::classify(day("2026-10-20"), today), Freshness::Upcoming);
        assert_eq!(Freshness::classify(day("2026-10-19"), today), Freshness::GracePeriod);
        assert_eq!(Freshness::classify(day("2026-10-18"), today), Freshness::GracePeriod);
        assert_eq!(Freshness::classify(day("2026-10-16"), today), Freshness::GracePeriod);
        assert_eq!(Freshness::classify(day("2026-10-15"), today), Freshness::Stale);
    }

    #[test]
    fn cohort_format_places_color_in_background_slot() {
        let format = cohort_format(CohortColor(5));
        assert_eq!(format, ",,,,,,2,,,5,,,,,,");
        assert_eq!(color_from_format(&format), Some(CohortColor(5)));
    }

    #[test]
    fn color_from_format_ignores_missing_or_blank_slot() {
        assert_eq!(color_from_format(""), None);
        assert_eq!(color_from_format(",,,,,,2,,,,,,,,,"), None);
        assert_eq!(color_from_format(",,,,,,,,,x,,,,,,"), None);
        assert_eq!(color_from_format(",,1,,,,,,,9"), Some(CohortColor(9)));
    }

    #[test]
    fn color_state_line_parses_and_encodes() {
        let state = ColorState::parse("2,2099-01-01,2099-03-01\n").expect("parse");
        assert_eq!(state.color_index, 2);
        assert_eq!(state.last_seen_hire_date, Some(day("2099-01-01")));
        assert_eq!(state.max_hire_date_seen, Some(day("2099-03-01")));
        assert_eq!(state.encode(), "2,2099-01-01,2099-03-01");

        let empty = ColorState::parse("0,,").expect("parse empty history");
        assert_eq!(empty, ColorState::default());
        assert_eq!(ColorState::default().encode(), "0,,");
    }

    #[test]
    fn malformed_color_state_is_rejected() {
        assert!(ColorState::parse("").is_none());
        assert!(ColorState::parse("x,,").is_none());
        assert!(ColorState::parse("1,2099-01-01").is_none());
        assert!(ColorState::parse("1,not-a-date,").is_none());
        assert!(ColorState::parse("-1,,").is_none());
    }

    #[test]
    fn observe_advances_only_when_the_cohort_changes() {
        let d1 = day("2099-01-01");
        let d2 = day("2099-02-01");
        let mut state = ColorState::default();
        let indices: Vec<usize> = [d1, d1, d2, d1]
            .into_iter()
            .map(|d| state.observe(d, 3))
            .collect();
        assert_eq!(indices, vec![1, 1, 2, 0]);
        assert_eq!(state.last_seen_hire_date, Some(d1));
        assert_eq!(state.max_hire_date_seen, Some(d2));
    }

    #[test]
    fn observe_wraps_out_of_range_index() {
        let mut state = ColorState {
            color_index: 7,
            last_seen_hire_date: Some(day("2099-01-01")),
            max_hire_date_seen: None,
        };
        assert_eq!(state.observe(day("2099-01-01"), 3), 1);
    }
}
