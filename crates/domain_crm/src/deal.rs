//! CRM deal records
//!
//! The CRM returns deals with loosely typed fields: amounts as numbers or
//! localized strings, counts as strings, dates with or without offsets, and
//! e-mail either as a plain string or as a list of `{VALUE: ..}` entries.
//! `RawCrmDeal` captures that shape verbatim; `CrmDealSnapshot` is the typed
//! view the rest of the system consumes.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use validator::ValidateEmail;

use core_kernel::{parse_amount, parse_count, parse_date_value, DealId, PortError};

/// Longest schedule the system accepts, in months
pub const MAX_TERM_MONTHS: i64 = 120;

/// A deal exactly as the CRM returned it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCrmDeal {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub title: Value,
    /// Contract total
    #[serde(default)]
    pub opportunity: Value,
    #[serde(default)]
    pub term_months: Value,
    #[serde(default)]
    pub down_payment: Value,
    /// Paid amount as last echoed to the CRM
    #[serde(default)]
    pub paid_amount: Value,
    #[serde(default)]
    pub begin_date: Value,
    #[serde(default)]
    pub date_created: Value,
    #[serde(default)]
    pub contact_email: Value,
}

/// Typed view of a CRM deal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmDealSnapshot {
    pub deal_id: DealId,
    pub title: String,
    pub total_amount: i64,
    pub term_months: u32,
    pub down_payment: i64,
    pub paid_amount: i64,
    /// Business start date, falling back to the record's creation date
    pub start_date: Option<NaiveDate>,
    pub contact_email: Option<String>,
}

impl RawCrmDeal {
    /// Normalizes the raw fields into a snapshot
    ///
    /// Negative amounts become zero, the term is clamped to
    /// `0..=MAX_TERM_MONTHS`, and a down payment larger than a known total is
    /// cut to the total.
    ///
    /// # Arguments
    ///
    /// * `requested` - The id the lookup was made with; used when the record
    ///   carries no id of its own
    ///
    /// # Errors
    ///
    /// Returns `PortError::Transformation` if the record's id cannot be used
    pub fn normalize(&self, requested: &DealId) -> Result<CrmDealSnapshot, PortError> {
        let deal_id = match text_of(&self.id) {
            Some(raw) => DealId::new(raw).map_err(|e| PortError::Transformation {
                message: e.to_string(),
            })?,
            None => requested.clone(),
        };

        let total_amount = parse_amount(&self.opportunity).max(0);
        let mut down_payment = parse_amount(&self.down_payment).max(0);
        if total_amount > 0 && down_payment > total_amount {
            warn!(deal_id = %deal_id, down_payment, total_amount, "CRM down payment exceeds total, capping");
            down_payment = total_amount;
        }

        let raw_term = parse_count(&self.term_months);
        if !(0..=MAX_TERM_MONTHS).contains(&raw_term) {
            warn!(deal_id = %deal_id, term = raw_term, "CRM term out of range, clamping");
        }
        let term_months = raw_term.clamp(0, MAX_TERM_MONTHS) as u32;

        let start_date = parse_date_value(&self.begin_date)
            .or_else(|| parse_date_value(&self.date_created));

        Ok(CrmDealSnapshot {
            deal_id,
            title: text_of(&self.title).unwrap_or_default(),
            total_amount,
            term_months,
            down_payment,
            paid_amount: parse_amount(&self.paid_amount).max(0),
            start_date,
            contact_email: extract_email(&self.contact_email),
        })
    }
}

/// Reads a scalar as trimmed text; numbers are rendered, blanks are absent
fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Picks the first usable address out of a CRM e-mail field
fn extract_email(value: &Value) -> Option<String> {
    let candidate = match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Array(items) => items.iter().find_map(|item| match item {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Object(map) => map
                .get("VALUE")
                .or_else(|| map.get("value"))
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string()),
            _ => None,
        }),
        _ => None,
    }?;

    candidate.validate_email().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requested() -> DealId {
        DealId::new("501").unwrap()
    }

    #[test]
    fn test_numeric_id_is_rendered() {
        let raw = RawCrmDeal {
            id: json!(501),
            ..Default::default()
        };
        assert_eq!(raw.normalize(&requested()).unwrap().deal_id.as_str(), "501");
    }

    #[test]
    fn test_email_list_shape() {
        let value = json!([{"ID": "7", "VALUE": "client@example.com", "VALUE_TYPE": "WORK"}]);
        assert_eq!(extract_email(&value), Some("client@example.com".to_string()));
    }

    #[test]
    fn test_invalid_email_dropped() {
        assert_eq!(extract_email(&json!("not-an-email")), None);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    proptest! {
        #[test]
        fn normalized_terms_stay_in_range(
            total in -1_000_000i64..10_000_000i64,
            down in -1_000_000i64..20_000_000i64,
            term in -50i64..500i64,
        ) {
            let raw = RawCrmDeal {
                opportunity: json!(total.to_string()),
                down_payment: json!(down),
                term_months: json!(term.to_string()),
                ..Default::default()
            };
            let snapshot = raw.normalize(&DealId::new("77").unwrap()).unwrap();

            prop_assert!(snapshot.total_amount >= 0);
            prop_assert!(snapshot.down_payment >= 0);
            if snapshot.total_amount > 0 {
                prop_assert!(snapshot.down_payment <= snapshot.total_amount);
            }
            prop_assert!(i64::from(snapshot.term_months) <= MAX_TERM_MONTHS);
        }
    }
}
