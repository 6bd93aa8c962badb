//! Schedule generation
//!
//! A schedule is derived, never stored: the same contract terms always
//! produce the same installments. The installment base (total less down
//! payment) is split by floor division and the remainder lands on the final
//! month, so due amounts always sum to the base exactly.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::{add_months, clamp_day, TemporalError};

/// Errors raised while building a schedule
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("term must be at least one month")]
    ZeroTerm,

    #[error("billing day {0} is outside 1..=31")]
    InvalidBillingDay(u32),

    #[error("calendar error: {0}")]
    Calendar(#[from] TemporalError),
}

/// Inputs of the schedule generator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTerms {
    pub total_amount: i64,
    pub down_payment: i64,
    pub term_months: u32,
    pub anchor: NaiveDate,
    pub billing_day: u32,
}

impl ScheduleTerms {
    /// Amount subject to scheduling
    pub fn installment_base(&self) -> i64 {
        (self.total_amount - self.down_payment).max(0)
    }
}

/// One month of a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    /// 0-based position in the schedule
    pub index: u32,
    pub due_date: NaiveDate,
    pub due_amount: i64,
}

/// Splits `base` into `term` due amounts, remainder on the last month
///
/// Returns an empty list when `term` is zero.
pub fn due_amounts(base: i64, term: u32) -> Vec<i64> {
    if term == 0 {
        return Vec::new();
    }
    let base = base.max(0);
    let term_i = i64::from(term);
    let monthly = base / term_i;
    let remainder = base % term_i;

    let mut amounts = vec![monthly; term as usize];
    if let Some(last) = amounts.last_mut() {
        *last += remainder;
    }
    amounts
}

/// Builds the installment schedule for a contract
///
/// The first due date falls in the anchor's own month when the anchor day is
/// before the billing day, otherwise in the following month. Each due date
/// uses the billing day clamped to the length of its month.
///
/// # Returns
///
/// An empty schedule when the down payment covers the whole total
///
/// # Errors
///
/// - `ScheduleError::ZeroTerm` if `term_months` is zero
/// - `ScheduleError::InvalidBillingDay` if the billing day is not a day of month
pub fn generate_schedule(terms: &ScheduleTerms) -> Result<Vec<ScheduledInstallment>, ScheduleError> {
    if terms.term_months == 0 {
        return Err(ScheduleError::ZeroTerm);
    }
    if !(1..=31).contains(&terms.billing_day) {
        return Err(ScheduleError::InvalidBillingDay(terms.billing_day));
    }

    let base = terms.installment_base();
    if base == 0 {
        return Ok(Vec::new());
    }

    let first_offset = if terms.anchor.day() < terms.billing_day { 0 } else { 1 };
    let (anchor_year, anchor_month) = (terms.anchor.year(), terms.anchor.month());

    due_amounts(base, terms.term_months)
        .into_iter()
        .enumerate()
        .map(|(i, due_amount)| {
            let index = i as u32;
            let (year, month) = add_months(anchor_year, anchor_month, first_offset + index);
            Ok(ScheduledInstallment {
                index,
                due_date: clamp_day(year, month, terms.billing_day)?,
                due_amount,
            })
        })
        .collect()
}
