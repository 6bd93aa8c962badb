//! Property-Based Test Generators
//!
//! Proptest strategies for contract terms, schedule anchors, and payment
//! sequences that respect the ledger's input rules.

use chrono::NaiveDate;
use proptest::prelude::*;

use domain_installment::{ScheduleTerms, MAX_TERM_MONTHS};

/// Strategy for positive amounts in whole currency units
pub fn positive_amount_strategy() -> impl Strategy<Value = i64> {
    1i64..10_000_000i64
}

/// Strategy for terms with a schedule
pub fn term_strategy() -> impl Strategy<Value = u32> {
    1u32..=MAX_TERM_MONTHS
}

pub fn billing_day_strategy() -> impl Strategy<Value = u32> {
    1u32..=31u32
}

/// Strategy for anchor dates across several years, including month ends
pub fn anchor_date_strategy() -> impl Strategy<Value = NaiveDate> {
    (2020i32..2030i32, 1u32..=12u32, 1u32..=31u32).prop_map(|(year, month, day)| {
        (0..4)
            .find_map(|back| NaiveDate::from_ymd_opt(year, month, day - back))
            .unwrap()
    })
}

/// Strategy for `(total, down_payment, term)` with `down_payment <= total`
pub fn contract_terms_strategy() -> impl Strategy<Value = (i64, i64, u32)> {
    (positive_amount_strategy(), term_strategy())
        .prop_flat_map(|(total, term)| (Just(total), 0i64..=total, Just(term)))
}

/// Strategy for complete schedule inputs
pub fn schedule_terms_strategy() -> impl Strategy<Value = ScheduleTerms> {
    (contract_terms_strategy(), anchor_date_strategy(), billing_day_strategy()).prop_map(
        |((total_amount, down_payment, term_months), anchor, billing_day)| ScheduleTerms {
            total_amount,
            down_payment,
            term_months,
            anchor,
            billing_day,
        },
    )
}

/// Strategy for a sequence of payment amounts, some of them likely to overshoot
pub fn payment_sequence_strategy(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::vec(1i64..200_000i64, 1..=max_len)
}

/// Strategy for amount strings the way a CRM or gateway may format them
///
/// Yields the text and the integer it must parse to.
pub fn formatted_amount_strategy() -> impl Strategy<Value = (String, i64)> {
    (0i64..100_000_000i64, 0u32..100u32, 0usize..4usize).prop_map(|(units, cents, style)| {
        let text = match style {
            0 => units.to_string(),
            1 => format!("{}.{:02}", units, cents),
            2 => format!("{},{:02}", units, cents),
            _ => format!(" {} ", group_thousands(units)),
        };
        (text, units)
    })
}

fn group_thousands(units: i64) -> String {
    let digits = units.to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    grouped
}

#[cfg(test)]
mod proptests {
    use super::*;
    use core_kernel::parse_amount_str;
    use domain_installment::generate_schedule;

    use crate::assertions::assert_schedule_matches_base;

    proptest! {
        #[test]
        fn formatted_amounts_parse_back((text, units) in formatted_amount_strategy()) {
            prop_assert_eq!(parse_amount_str(&text), units);
        }

        #[test]
        fn generated_terms_have_a_valid_schedule(terms in schedule_terms_strategy()) {
            let schedule = generate_schedule(&terms).unwrap();
            assert_schedule_matches_base(&schedule, &terms);
        }
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(1234567), "1 234 567");
        assert_eq!(group_thousands(999), "999");
    }
}
