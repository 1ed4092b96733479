//! Parsing of event start values.
//!
//! Providers send either a date-only value for all-day events or a
//! timestamp. [`StartTime`] keeps that distinction so that date-only values
//! are compared as calendar dates, without any timezone conversion.

use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use regex::Regex;

static DATE_ONLY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("Invalid date-only regex"));

/// Timestamp layouts accepted without an explicit offset; interpreted in
/// the local timezone.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Returns `true` if `value` is a date-only `YYYY-MM-DD` string.
pub fn is_date_only(value: &str) -> bool {
    DATE_ONLY_REGEX.is_match(value)
}

/// A parsed event start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTime {
    /// All-day event date.
    Date(NaiveDate),
    /// A point in time, expressed in the local timezone.
    Instant(DateTime<Local>),
}

impl StartTime {
    /// Parses a date-only value or a timestamp.
    ///
    /// Timestamps carrying an offset are converted to local time; timestamps
    /// without one are taken as local wall-clock time. Returns `None` for
    /// anything else.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        if is_date_only(value) {
            return NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().map(Self::Date);
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(Self::Instant(dt.with_timezone(&Local)));
        }

        if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M%:z") {
            return Some(Self::Instant(dt.with_timezone(&Local)));
        }

        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .and_then(|naive| Local.from_local_datetime(&naive).earliest())
            .map(Self::Instant)
    }

    /// Returns the local calendar date of this start.
    pub fn local_date(&self) -> NaiveDate {
        match self {
            Self::Date(date) => *date,
            Self::Instant(dt) => dt.date_naive(),
        }
    }

    /// Returns the sort position in epoch milliseconds.
    ///
    /// Date-only values sort as local midnight.
    pub fn sort_millis(&self) -> i64 {
        match self {
            Self::Date(date) => date
                .and_hms_opt(0, 0, 0)
                .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
                .map(|dt| dt.timestamp_millis())
                .unwrap_or(i64::MAX),
            Self::Instant(dt) => dt.timestamp_millis(),
        }
    }

    /// Returns `true` for all-day values.
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::Date(_))
    }
}
