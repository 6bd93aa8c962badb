//! Amount normalization for external payloads
//!
//! CRM records and gateway notifications carry amounts as JSON numbers, numeric
//! strings using either `.` or `,` as the decimal separator, strings with
//! thousands grouping, or nothing at all. Inside the system every amount is an
//! exact `i64` in minor currency units, truncated toward zero.
//!
//! Two flavours are offered:
//! - [`try_parse_amount`] reports why a value could not be read
//! - [`parse_amount`] never fails and yields `0` for anything unreadable

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while reading an external amount
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount is empty")]
    Empty,

    #[error("Amount is not numeric: {0}")]
    NotNumeric(String),

    #[error("Amount out of range: {0}")]
    OutOfRange(String),
}

/// Characters used as thousands grouping in CRM exports
const GROUPING_CHARS: [char; 4] = [' ', '\u{00A0}', '\u{202F}', '\''];

/// Reads an amount from a JSON value, reporting the failure reason
///
/// # Arguments
///
/// * `value` - Raw JSON value as received from an external system
///
/// # Errors
///
/// * `MoneyError::Empty` for `null` or blank strings
/// * `MoneyError::NotNumeric` for booleans, arrays, objects, and unparsable text
/// * `MoneyError::OutOfRange` when the truncated value does not fit in `i64`
pub fn try_parse_amount(value: &Value) -> Result<i64, MoneyError> {
    match value {
        Value::Null => Err(MoneyError::Empty),
        Value::Bool(b) => Err(MoneyError::NotNumeric(b.to_string())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            match n.as_f64() {
                Some(f) => truncate_float(f),
                None => Err(MoneyError::OutOfRange(n.to_string())),
            }
        }
        Value::String(s) => try_parse_amount_str(s),
        other => Err(MoneyError::NotNumeric(other.to_string())),
    }
}

/// Reads an amount from text, reporting the failure reason
pub fn try_parse_amount_str(raw: &str) -> Result<i64, MoneyError> {
    let normalized = normalize_numeric_text(raw);
    if normalized.is_empty() {
        return Err(MoneyError::Empty);
    }

    let decimal = Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .map_err(|_| MoneyError::NotNumeric(raw.trim().to_string()))?;

    decimal
        .trunc()
        .to_i64()
        .ok_or_else(|| MoneyError::OutOfRange(raw.trim().to_string()))
}

/// Reads an amount from a JSON value, yielding `0` when it cannot be read
pub fn parse_amount(value: &Value) -> i64 {
    try_parse_amount(value).unwrap_or(0)
}

/// Reads an amount from text, yielding `0` when it cannot be read
pub fn parse_amount_str(raw: &str) -> i64 {
    try_parse_amount_str(raw).unwrap_or(0)
}

/// Reads an integer count (e.g. a term in months) with the same leniency as amounts
pub fn parse_count(value: &Value) -> i64 {
    parse_amount(value)
}

fn truncate_float(f: f64) -> Result<i64, MoneyError> {
    let truncated = f.trunc();
    if !truncated.is_finite() || truncated < i64::MIN as f64 || truncated >= i64::MAX as f64 {
        return Err(MoneyError::OutOfRange(f.to_string()));
    }
    Ok(truncated as i64)
}

/// Strips grouping characters and settles on `.` as the decimal separator
///
/// When both `,` and `.` appear, the one occurring last is the decimal
/// separator and the other is grouping. A lone separator kind appearing more
/// than once is grouping.
fn normalize_numeric_text(raw: &str) -> String {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !GROUPING_CHARS.contains(c))
        .collect();
    let compact = compact.strip_prefix('+').unwrap_or(&compact).to_string();

    let last_comma = compact.rfind(',');
    let last_dot = compact.rfind('.');

    match (last_comma, last_dot) {
        (Some(comma), Some(dot)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(_), None) if compact.matches(',').count() > 1 => compact.replace(',', ""),
        (Some(_), None) => compact.replace(',', "."),
        (None, Some(_)) if compact.matches('.').count() > 1 => compact.replace('.', ""),
        _ => compact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_handles_mixed_separators() {
        assert_eq!(normalize_numeric_text("1,234.56"), "1234.56");
        assert_eq!(normalize_numeric_text("1.234,56"), "1234.56");
        assert_eq!(normalize_numeric_text("1 234 567"), "1234567");
        assert_eq!(normalize_numeric_text("12,5"), "12.5");
    }

    #[test]
    fn test_integers_pass_through() {
        assert_eq!(try_parse_amount(&json!(150000)), Ok(150000));
        assert_eq!(try_parse_amount(&json!(-42)), Ok(-42));
    }

    #[test]
    fn test_floats_truncate_toward_zero() {
        assert_eq!(try_parse_amount(&json!(1500.99)), Ok(1500));
        assert_eq!(try_parse_amount(&json!(-7.8)), Ok(-7));
    }

    #[test]
    fn test_failure_reasons() {
        assert_eq!(try_parse_amount(&Value::Null), Err(MoneyError::Empty));
        assert!(matches!(try_parse_amount(&json!(true)), Err(MoneyError::NotNumeric(_))));
        assert!(matches!(try_parse_amount(&json!([1, 2])), Err(MoneyError::NotNumeric(_))));
        assert!(matches!(try_parse_amount_str("12abc"), Err(MoneyError::NotNumeric(_))));
        assert_eq!(try_parse_amount_str("   "), Err(MoneyError::Empty));
    }
}
