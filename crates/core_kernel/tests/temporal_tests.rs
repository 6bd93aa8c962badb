//! Unit tests for calendar helpers and clocks
//!
//! Tests cover external date parsing, month arithmetic, day clamping,
//! and the fixed clock used by the rest of the test suite.

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use core_kernel::{
    add_months, clamp_day, last_day_of_month, parse_calendar_date, parse_date_value, Clock,
    FixedClock, SystemClock, TemporalError,
};
use serde_json::json;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

mod parsing {
    use super::*;

    #[test]
    fn test_plain_date() {
        assert_eq!(parse_calendar_date("2024-05-17"), Some(date(2024, 5, 17)));
    }

    #[test]
    fn test_zulu_timestamp() {
        assert_eq!(parse_calendar_date("2024-05-17T23:59:59Z"), Some(date(2024, 5, 17)));
    }

    #[test]
    fn test_offset_timestamp() {
        assert_eq!(
            parse_calendar_date("2024-05-17T10:00:00+03:00"),
            Some(date(2024, 5, 17))
        );
    }

    #[test]
    fn test_naive_timestamp_with_fraction() {
        assert_eq!(
            parse_calendar_date("2024-05-17T10:00:00.123456"),
            Some(date(2024, 5, 17))
        );
    }

    #[test]
    fn test_space_separated_timestamp() {
        assert_eq!(parse_calendar_date("2024-05-17 08:30:00"), Some(date(2024, 5, 17)));
    }

    #[test]
    fn test_leading_date_fallback() {
        assert_eq!(parse_calendar_date("2024-05-17 garbage"), Some(date(2024, 5, 17)));
    }

    #[test]
    fn test_unparsable_is_absent() {
        assert_eq!(parse_calendar_date("17/05/2024"), None);
        assert_eq!(parse_calendar_date(""), None);
        assert_eq!(parse_calendar_date("2024-02-30"), None);
    }

    #[test]
    fn test_json_value() {
        assert_eq!(parse_date_value(&json!("2024-01-10")), Some(date(2024, 1, 10)));
        assert_eq!(parse_date_value(&json!(20240110)), None);
        assert_eq!(parse_date_value(&json!(null)), None);
    }
}

mod month_arithmetic {
    use super::*;

    #[test]
    fn test_month_lengths() {
        assert_eq!(last_day_of_month(2023, 2), Ok(28));
        assert_eq!(last_day_of_month(2024, 2), Ok(29));
        assert_eq!(last_day_of_month(2024, 4), Ok(30));
        assert_eq!(last_day_of_month(2024, 12), Ok(31));
    }

    #[test]
    fn test_invalid_month() {
        assert_eq!(last_day_of_month(2024, 13), Err(TemporalError::InvalidMonth(13)));
        assert_eq!(last_day_of_month(2024, 0), Err(TemporalError::InvalidMonth(0)));
    }

    #[test]
    fn test_add_months() {
        assert_eq!(add_months(2024, 1, 1), (2024, 2));
        assert_eq!(add_months(2024, 12, 1), (2025, 1));
        assert_eq!(add_months(2024, 6, 18), (2025, 12));
    }

    #[test]
    fn test_clamp_day_in_february() {
        assert_eq!(clamp_day(2025, 2, 31), Ok(date(2025, 2, 28)));
        assert_eq!(clamp_day(2024, 2, 30), Ok(date(2024, 2, 29)));
    }

    #[test]
    fn test_clamp_day_keeps_valid_day() {
        assert_eq!(clamp_day(2024, 3, 10), Ok(date(2024, 3, 10)));
    }

    #[test]
    fn test_clamp_day_raises_zero_to_first() {
        assert_eq!(clamp_day(2024, 3, 0), Ok(date(2024, 3, 1)));
    }
}

mod clocks {
    use super::*;

    #[test]
    fn test_fixed_clock_is_frozen() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let clock = FixedClock::new(instant);
        assert_eq!(clock.now(), instant);
        assert_eq!(clock.now(), instant);
    }

    #[test]
    fn test_fixed_clock_set_and_advance() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
        clock.advance(Duration::seconds(31));
        assert_eq!(clock.now(), Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 31).unwrap());

        clock.set(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(clock.today(), date(2025, 1, 1));
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
