//! Calendar arithmetic and time sources
//!
//! This module provides:
//! - Lenient parsing of external date strings into calendar dates
//! - Month stepping and day clamping for billing calendars
//! - The `Clock` abstraction so that "now" can be injected and frozen in tests

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors related to calendar operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemporalError {
    #[error("Invalid month: {0}")]
    InvalidMonth(u32),

    #[error("Date out of range: {year}-{month:02}-{day:02}")]
    OutOfRange {
        year: i32,
        month: u32,
        day: u32,
    },
}

/// Parses an external date string into a calendar date
///
/// Accepts RFC 3339 timestamps (offset or `Z`), naive ISO timestamps, and
/// plain `YYYY-MM-DD`. As a last resort the leading ten characters are read
/// as a date. The calendar date is taken in the timestamp's own offset.
///
/// # Returns
///
/// `None` when nothing date-like can be read; a date is never guessed.
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.date_naive());
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt.date());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }

    trimmed
        .get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// Parses a date carried in a JSON value; only strings can hold dates
pub fn parse_date_value(value: &Value) -> Option<NaiveDate> {
    value.as_str().and_then(parse_calendar_date)
}

/// Returns the number of days in the given month
///
/// # Errors
///
/// Returns `TemporalError::InvalidMonth` when `month` is not in 1..=12
pub fn last_day_of_month(year: i32, month: u32) -> Result<u32, TemporalError> {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => Ok(31),
        4 | 6 | 9 | 11 => Ok(30),
        2 if NaiveDate::from_ymd_opt(year, 2, 29).is_some() => Ok(29),
        2 => Ok(28),
        other => Err(TemporalError::InvalidMonth(other)),
    }
}

/// Steps `months` calendar months forward from `(year, month)`
///
/// `month` is 1-based; the result is normalized into 1..=12.
pub fn add_months(year: i32, month: u32, months: u32) -> (i32, u32) {
    let zero_based = i64::from(year) * 12 + i64::from(month.saturating_sub(1)) + i64::from(months);
    let new_year = zero_based.div_euclid(12) as i32;
    let new_month = zero_based.rem_euclid(12) as u32 + 1;
    (new_year, new_month)
}

/// Builds the date for `day` in the given month, clamped to the month's last day
///
/// # Examples
///
/// ```rust
/// use core_kernel::clamp_day;
/// use chrono::NaiveDate;
///
/// let date = clamp_day(2025, 2, 31).unwrap();
/// assert_eq!(date, NaiveDate::from_ymd_opt(2025, 2, 28).unwrap());
/// ```
pub fn clamp_day(year: i32, month: u32, day: u32) -> Result<NaiveDate, TemporalError> {
    let last = last_day_of_month(year, month)?;
    let day = day.clamp(1, last);
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(TemporalError::OutOfRange { year, month, day })
}

/// Source of the current instant
///
/// Everything that depends on "now" (anchor fixing, duplicate windows, cache
/// expiry, record timestamps) reads it through this trait.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar date in UTC
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Shared handle to a clock
pub type SharedClock = Arc<dyn Clock>;

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    instant: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock frozen at `instant`
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    /// Moves the clock to `instant`
    pub fn set(&self, instant: DateTime<Utc>) {
        match self.instant.lock() {
            Ok(mut guard) => *guard = instant,
            Err(poisoned) => *poisoned.into_inner() = instant,
        }
    }

    /// Moves the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        let next = self.now() + by;
        self.set(next);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.instant.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_keeps_local_calendar_day() {
        let date = parse_calendar_date("2024-03-01T01:30:00+03:00").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_add_months_wraps_year() {
        assert_eq!(add_months(2024, 11, 3), (2025, 2));
        assert_eq!(add_months(2024, 12, 0), (2024, 12));
        assert_eq!(add_months(2024, 1, 24), (2026, 1));
    }

    #[test]
    fn test_fixed_clock_advances() {
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(Duration::days(1));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }
}
