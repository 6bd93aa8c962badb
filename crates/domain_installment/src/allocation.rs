//! Allocation ledger
//!
//! Maps confirmed payments onto schedule months. Entries are append-only;
//! per-month paid amounts and statuses are always recomputed from them.
//!
//! Two ways to read a contract's ledger:
//! - **Explicit**: sum the month-slot entries. Authoritative whenever any exist.
//! - **Reconstructed**: for legacy contracts without entries, pour the
//!   aggregate paid amount into the months in order.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use core_kernel::{DealId, PaymentId};

use crate::error::InstallmentError;
use crate::schedule::ScheduledInstallment;

/// Stored month index of the down-payment slot
pub const DOWN_PAYMENT_SLOT: i32 = -1;

/// Where an allocation entry lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationSlot {
    /// 0-based schedule month
    Month(u32),
    /// Not tied to a month
    DownPayment,
}

impl AllocationSlot {
    /// Storage representation, `-1` for the down-payment slot
    pub fn to_index(self) -> i32 {
        match self {
            AllocationSlot::Month(i) => i as i32,
            AllocationSlot::DownPayment => DOWN_PAYMENT_SLOT,
        }
    }

    pub fn from_index(index: i32) -> Self {
        if index < 0 {
            AllocationSlot::DownPayment
        } else {
            AllocationSlot::Month(index as u32)
        }
    }

    pub fn month(self) -> Option<u32> {
        match self {
            AllocationSlot::Month(i) => Some(i),
            AllocationSlot::DownPayment => None,
        }
    }
}

/// One slice of a payment assigned to a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationEntry {
    pub deal_id: DealId,
    pub payment_id: PaymentId,
    pub slot: AllocationSlot,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// A planned `(month, amount)` assignment, before it is stamped into entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPart {
    pub month_index: u32,
    pub amount: i64,
}

impl AllocationPart {
    pub fn into_entry(self, deal_id: &DealId, payment_id: &PaymentId, now: DateTime<Utc>) -> AllocationEntry {
        AllocationEntry {
            deal_id: deal_id.clone(),
            payment_id: payment_id.clone(),
            slot: AllocationSlot::Month(self.month_index),
            amount: self.amount,
            created_at: now,
        }
    }
}

/// Sums month-slot entries per month for a schedule of `term` months
///
/// Entries outside the schedule are left out.
pub fn month_totals(entries: &[AllocationEntry], term: usize) -> Vec<i64> {
    let mut totals = vec![0i64; term];
    for entry in entries {
        if let Some(total) = entry.slot.month().and_then(|m| totals.get_mut(m as usize)) {
            *total += entry.amount;
        }
    }
    totals
}

/// Plans the sequential fill of `amount` over the months
///
/// Each month takes up to its open capacity (`due - already`) in order. A
/// residual after the last month lands on the last month as an extra part.
///
/// # Arguments
///
/// * `due` - Due amount per month
/// * `already` - Amount already allocated per month, same length as `due`
/// * `amount` - Confirmed amount to spread
pub fn plan_sequential_fill(due: &[i64], already: &[i64], amount: i64) -> Vec<AllocationPart> {
    let mut parts = Vec::new();
    if due.is_empty() || amount <= 0 {
        return parts;
    }

    let mut left = amount;
    for (index, due_amount) in due.iter().enumerate() {
        if left == 0 {
            break;
        }
        let taken = already.get(index).copied().unwrap_or(0);
        let capacity = (due_amount - taken).max(0);
        let part = capacity.min(left);
        if part > 0 {
            parts.push(AllocationPart {
                month_index: index as u32,
                amount: part,
            });
            left -= part;
        }
    }

    if left > 0 {
        parts.push(AllocationPart {
            month_index: (due.len() - 1) as u32,
            amount: left,
        });
    }
    parts
}

/// Validates operator-chosen `(month_index, amount)` pairs against the schedule
///
/// Duplicate months are summed. A month may not end up above its due amount,
/// except the final month, which takes overpayment.
///
/// # Returns
///
/// The merged parts in month order
///
/// # Errors
///
/// `InstallmentError::Validation` naming the offending month
pub fn validate_explicit(
    due: &[i64],
    already: &[i64],
    requested: &[(i64, i64)],
) -> Result<Vec<AllocationPart>, InstallmentError> {
    if requested.is_empty() {
        return Err(InstallmentError::validation("allocation list is empty"));
    }
    if due.is_empty() {
        return Err(InstallmentError::validation(
            "contract has no schedule to allocate against",
        ));
    }

    let mut merged: BTreeMap<u32, i64> = BTreeMap::new();
    for &(month_index, amount) in requested {
        if amount <= 0 {
            return Err(InstallmentError::validation(format!(
                "allocation amount for month {} must be positive, got {}",
                month_index, amount
            )));
        }
        if month_index < 0 {
            return Err(InstallmentError::validation(format!(
                "month_index must not be negative, got {}",
                month_index
            )));
        }
        if month_index >= due.len() as i64 {
            return Err(InstallmentError::validation(format!(
                "month_index {} is outside the {}-month schedule",
                month_index,
                due.len()
            )));
        }
        *merged.entry(month_index as u32).or_insert(0) += amount;
    }

    let last = (due.len() - 1) as u32;
    for (&month_index, &amount) in &merged {
        if month_index == last {
            continue;
        }
        let i = month_index as usize;
        let taken = already.get(i).copied().unwrap_or(0);
        let open = (due[i] - taken).max(0);
        if amount > open {
            return Err(InstallmentError::validation(format!(
                "allocation of {} to month {} exceeds its open amount of {}",
                amount, month_index, open
            )));
        }
    }

    Ok(merged
        .into_iter()
        .map(|(month_index, amount)| AllocationPart { month_index, amount })
        .collect())
}

/// Human readable allocation summary, months 1-based: `#1:5000, #2:3000`
pub fn summarize(parts: &[AllocationPart]) -> String {
    parts
        .iter()
        .map(|p| format!("#{}:{}", p.month_index + 1, p.amount))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Per-month status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallmentStatus {
    Paid,
    Partial,
    Pending,
}

impl InstallmentStatus {
    pub fn derive(paid_in_month: i64, due_amount: i64) -> Self {
        if paid_in_month >= due_amount {
            InstallmentStatus::Paid
        } else if paid_in_month > 0 {
            InstallmentStatus::Partial
        } else {
            InstallmentStatus::Pending
        }
    }
}

/// Which data produced a ledger view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationSource {
    Explicit,
    Reconstructed,
}

/// One schedule month with its paid state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallmentView {
    pub index: u32,
    pub due_date: NaiveDate,
    pub due_amount: i64,
    pub paid_in_month: i64,
    pub remaining_in_month: i64,
    pub status: InstallmentStatus,
}

/// Paid state of a whole schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerView {
    pub installments: Vec<InstallmentView>,
    pub paid_months: u32,
    /// Sum of `paid_in_month` over the schedule
    pub allocated_total: i64,
    pub allocation_source: AllocationSource,
    /// Explicit allocations minus the aggregate they should match, when they differ
    pub allocation_discrepancy: Option<i64>,
}

impl LedgerView {
    /// Combines a schedule with the contract's allocation entries
    ///
    /// Explicit month entries win when present. Their capped sum is compared
    /// with the capped aggregate paid amount; a mismatch is logged and
    /// reported but nothing is rewritten.
    pub fn build(
        deal_id: &DealId,
        schedule: &[ScheduledInstallment],
        entries: &[AllocationEntry],
        paid_amount: i64,
    ) -> Self {
        let due: Vec<i64> = schedule.iter().map(|s| s.due_amount).collect();
        let base: i64 = due.iter().sum();
        let has_explicit = entries.iter().any(|e| e.slot.month().is_some());

        let (paid_per_month, source, discrepancy) = if has_explicit {
            let totals = month_totals(entries, due.len());
            let explicit_sum: i64 = totals.iter().sum();
            let expected = paid_amount.clamp(0, base);
            let difference = explicit_sum.min(base) - expected;
            if difference != 0 {
                warn!(
                    deal_id = %deal_id,
                    explicit_sum,
                    paid_amount,
                    difference,
                    "Allocation entries disagree with aggregate paid amount"
                );
            }
            (totals, AllocationSource::Explicit, (difference != 0).then_some(difference))
        } else {
            let zeros = vec![0i64; due.len()];
            let mut totals = zeros.clone();
            for part in plan_sequential_fill(&due, &zeros, paid_amount.clamp(0, base)) {
                totals[part.month_index as usize] += part.amount;
            }
            (totals, AllocationSource::Reconstructed, None)
        };

        let installments: Vec<InstallmentView> = schedule
            .iter()
            .zip(&paid_per_month)
            .map(|(s, &paid_in_month)| InstallmentView {
                index: s.index,
                due_date: s.due_date,
                due_amount: s.due_amount,
                paid_in_month,
                remaining_in_month: (s.due_amount - paid_in_month).max(0),
                status: InstallmentStatus::derive(paid_in_month, s.due_amount),
            })
            .collect();

        Self {
            paid_months: installments
                .iter()
                .filter(|i| i.status == InstallmentStatus::Paid)
                .count() as u32,
            allocated_total: paid_per_month.iter().sum(),
            installments,
            allocation_source: source,
            allocation_discrepancy: discrepancy,
        }
    }

    /// View of a contract without a schedule
    pub fn empty() -> Self {
        Self {
            installments: Vec::new(),
            paid_months: 0,
            allocated_total: 0,
            allocation_source: AllocationSource::Reconstructed,
            allocation_discrepancy: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal() -> DealId {
        DealId::new("42").unwrap()
    }

    fn entry(payment: &str, month: u32, amount: i64) -> AllocationEntry {
        AllocationEntry {
            deal_id: deal(),
            payment_id: PaymentId::new(payment).unwrap(),
            slot: AllocationSlot::Month(month),
            amount,
            created_at: Utc::now(),
        }
    }

    fn schedule(due: &[i64]) -> Vec<ScheduledInstallment> {
        due.iter()
            .enumerate()
            .map(|(i, &due_amount)| ScheduledInstallment {
                index: i as u32,
                due_date: NaiveDate::from_ymd_opt(2024, 1 + i as u32, 10).unwrap(),
                due_amount,
            })
            .collect()
    }

    #[test]
    fn test_slot_storage_index() {
        assert_eq!(AllocationSlot::DownPayment.to_index(), -1);
        assert_eq!(AllocationSlot::from_index(-1), AllocationSlot::DownPayment);
        assert_eq!(AllocationSlot::from_index(3), AllocationSlot::Month(3));
    }

    #[test]
    fn test_fill_splits_across_months() {
        let parts = plan_sequential_fill(&[100, 100, 100], &[60, 0, 0], 90);
        assert_eq!(
            parts,
            vec![
                AllocationPart { month_index: 0, amount: 40 },
                AllocationPart { month_index: 1, amount: 50 },
            ]
        );
    }

    #[test]
    fn test_fill_overpayment_lands_on_last_month() {
        let parts = plan_sequential_fill(&[10000, 10000], &[10000, 0], 15000);
        assert_eq!(
            parts,
            vec![
                AllocationPart { month_index: 1, amount: 10000 },
                AllocationPart { month_index: 1, amount: 5000 },
            ]
        );
    }

    #[test]
    fn test_explicit_merges_duplicates() {
        let parts = validate_explicit(&[100, 100, 100], &[0, 0, 0], &[(1, 30), (0, 50), (1, 20)]).unwrap();
        assert_eq!(
            parts,
            vec![
                AllocationPart { month_index: 0, amount: 50 },
                AllocationPart { month_index: 1, amount: 50 },
            ]
        );
        assert_eq!(summarize(&parts), "#1:50, #2:50");
    }

    #[test]
    fn test_explicit_rejects_overfilled_month() {
        let err = validate_explicit(&[100, 100], &[80, 0], &[(0, 30)]).unwrap_err();
        assert!(err.to_string().contains("exceeds its open amount of 20"));
    }

    #[test]
    fn test_explicit_allows_overpayment_on_last_month() {
        let parts = validate_explicit(&[100, 100], &[100, 100], &[(1, 40)]).unwrap();
        assert_eq!(parts, vec![AllocationPart { month_index: 1, amount: 40 }]);
    }

    #[test]
    fn test_explicit_rejects_out_of_range_month() {
        assert!(validate_explicit(&[100, 100], &[0, 0], &[(2, 10)]).is_err());
        assert!(validate_explicit(&[100, 100], &[0, 0], &[(-1, 10)]).is_err());
        assert!(validate_explicit(&[100, 100], &[0, 0], &[(0, 0)]).is_err());
        assert!(validate_explicit(&[], &[], &[(0, 10)]).is_err());
    }

    #[test]
    fn test_view_explicit() {
        let view = LedgerView::build(
            &deal(),
            &schedule(&[50000; 6]),
            &[entry("p1", 0, 40000)],
            40000,
        );
        assert_eq!(view.allocation_source, AllocationSource::Explicit);
        assert_eq!(view.installments[0].status, InstallmentStatus::Partial);
        assert_eq!(view.installments[0].remaining_in_month, 10000);
        assert_eq!(view.installments[1].status, InstallmentStatus::Pending);
        assert_eq!(view.paid_months, 0);
        assert_eq!(view.allocation_discrepancy, None);
    }

    #[test]
    fn test_view_reconstructed_from_aggregate() {
        let view = LedgerView::build(&deal(), &schedule(&[100, 100, 100]), &[], 150);
        assert_eq!(view.allocation_source, AllocationSource::Reconstructed);
        let statuses: Vec<_> = view.installments.iter().map(|i| i.status).collect();
        assert_eq!(
            statuses,
            vec![InstallmentStatus::Paid, InstallmentStatus::Partial, InstallmentStatus::Pending]
        );
        assert_eq!(view.paid_months, 1);
        assert_eq!(view.allocated_total, 150);
    }

    #[test]
    fn test_view_reports_discrepancy() {
        let view = LedgerView::build(&deal(), &schedule(&[100, 100]), &[entry("p1", 0, 100)], 150);
        assert_eq!(view.allocation_source, AllocationSource::Explicit);
        assert_eq!(view.allocation_discrepancy, Some(-50));
        assert_eq!(view.installments[1].paid_in_month, 0);
    }

    #[test]
    fn test_view_ignores_down_payment_slot() {
        let mut down = entry("p0", 0, 500);
        down.slot = AllocationSlot::DownPayment;
        let view = LedgerView::build(&deal(), &schedule(&[100, 100]), &[down], 0);
        assert_eq!(view.allocation_source, AllocationSource::Reconstructed);
        assert_eq!(view.allocated_total, 0);
    }
}
