//! Custom Test Assertions
//!
//! Ledger invariants with failure messages that name the deal, month, or
//! payment at fault.

use std::collections::HashMap;

use domain_installment::{
    AllocationEntry, AllocationPart, Contract, InstallmentStatus, LedgerView, PaymentRecord,
    PaymentStatus, ScheduleTerms, ScheduledInstallment,
};

/// Asserts the schedule has one row per month, due amounts summing to the base,
/// due dates strictly increasing on or before the billing day
pub fn assert_schedule_matches_base(schedule: &[ScheduledInstallment], terms: &ScheduleTerms) {
    let base = terms.installment_base();
    if base == 0 {
        assert!(schedule.is_empty(), "Expected empty schedule for zero base, got {} rows", schedule.len());
        return;
    }

    assert_eq!(
        schedule.len(),
        terms.term_months as usize,
        "Expected {} installments, got {}",
        terms.term_months,
        schedule.len()
    );

    let sum: i64 = schedule.iter().map(|s| s.due_amount).sum();
    assert_eq!(sum, base, "Due amounts sum to {}, base is {}", sum, base);

    for pair in schedule.windows(2) {
        assert!(
            pair[0].due_date < pair[1].due_date,
            "Due dates not increasing: month {} {} then month {} {}",
            pair[0].index,
            pair[0].due_date,
            pair[1].index,
            pair[1].due_date
        );
    }
    for row in schedule {
        assert!(
            chrono::Datelike::day(&row.due_date) <= terms.billing_day,
            "Month {} due on {} is past billing day {}",
            row.index,
            row.due_date,
            terms.billing_day
        );
    }
}

/// Asserts the parts of one payment add up to its amount
pub fn assert_allocation_conserves(parts: &[AllocationPart], amount: i64) {
    let sum: i64 = parts.iter().map(|p| p.amount).sum();
    assert_eq!(sum, amount, "Allocated {} of a {} payment: {:?}", sum, amount, parts);
    assert!(
        parts.iter().all(|p| p.amount > 0),
        "Allocation parts must be positive: {:?}",
        parts
    );
}

/// Asserts no month holds more than its due amount, the last month excepted
pub fn assert_months_within_due(entries: &[AllocationEntry], due: &[i64]) {
    let mut per_month: HashMap<u32, i64> = HashMap::new();
    for entry in entries {
        if let Some(month) = entry.slot.month() {
            *per_month.entry(month).or_default() += entry.amount;
        }
    }

    let last = due.len().saturating_sub(1) as u32;
    for (month, total) in per_month {
        assert!(
            (month as usize) < due.len(),
            "Allocation to month {} beyond a {}-month schedule",
            month,
            due.len()
        );
        if month != last {
            assert!(
                total <= due[month as usize],
                "Month {} holds {} but only {} is due",
                month,
                total,
                due[month as usize]
            );
        }
    }
}

/// Asserts the aggregate never exceeds a known total
pub fn assert_paid_within_total(contract: &Contract) {
    assert!(contract.paid_amount >= 0, "Negative paid amount on deal {}", contract.deal_id);
    if contract.total_amount > 0 {
        assert!(
            contract.paid_amount <= contract.total_amount,
            "Deal {} paid {} exceeds total {}",
            contract.deal_id,
            contract.paid_amount,
            contract.total_amount
        );
    }
}

/// Asserts each payment id appears once and the paid records explain the aggregate
///
/// The aggregate equals the sum of paid records capped at the total.
pub fn assert_paid_matches_records(contract: &Contract, records: &[PaymentRecord]) {
    let mut seen = HashMap::new();
    for record in records {
        let count = seen.entry(record.payment_id.clone()).or_insert(0);
        *count += 1;
        assert_eq!(*count, 1, "Payment {} recorded twice", record.payment_id);
    }

    let paid: i64 = records
        .iter()
        .filter(|r| r.status == PaymentStatus::Paid)
        .map(|r| r.amount)
        .sum();
    let expected = if contract.total_amount > 0 {
        paid.min(contract.total_amount)
    } else {
        paid
    };
    assert_eq!(
        contract.paid_amount, expected,
        "Deal {} aggregate {} does not match paid records {}",
        contract.deal_id, contract.paid_amount, paid
    );
}

/// Asserts that no month that was paid in `before` is unpaid in `after`
pub fn assert_status_monotonic(before: &LedgerView, after: &LedgerView) {
    for (old, new) in before.installments.iter().zip(&after.installments) {
        if old.status == InstallmentStatus::Paid {
            assert_eq!(
                new.status,
                InstallmentStatus::Paid,
                "Month {} went from paid to {:?}",
                old.index,
                new.status
            );
        }
    }
    assert!(
        after.paid_months >= before.paid_months,
        "Paid months dropped from {} to {}",
        before.paid_months,
        after.paid_months
    );
}

/// Asserts the per-month statuses follow from the paid amounts
pub fn assert_statuses_consistent(view: &LedgerView) {
    for row in &view.installments {
        let expected = InstallmentStatus::derive(row.paid_in_month, row.due_amount);
        assert_eq!(
            row.status, expected,
            "Month {} has {:?} with {} of {} paid",
            row.index, row.status, row.paid_in_month, row.due_amount
        );
        assert_eq!(
            row.remaining_in_month,
            (row.due_amount - row.paid_in_month).max(0),
            "Month {} remaining is off",
            row.index
        );
    }
    let paid = view
        .installments
        .iter()
        .filter(|r| r.status == InstallmentStatus::Paid)
        .count() as u32;
    assert_eq!(view.paid_months, paid, "paid_months does not match statuses");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{IdFixtures, TemporalFixtures};
    use domain_installment::{AllocationSlot, PaymentSource};

    fn entry(month: u32, amount: i64) -> AllocationEntry {
        AllocationEntry {
            deal_id: IdFixtures::deal("1"),
            payment_id: IdFixtures::payment("p"),
            slot: AllocationSlot::Month(month),
            amount,
            created_at: TemporalFixtures::now(),
        }
    }

    #[test]
    fn test_last_month_may_overflow() {
        assert_months_within_due(&[entry(0, 100), entry(1, 150)], &[100, 100]);
    }

    #[test]
    #[should_panic(expected = "Month 0 holds 150")]
    fn test_inner_month_overflow_panics() {
        assert_months_within_due(&[entry(0, 150)], &[100, 100]);
    }

    #[test]
    fn test_paid_records_capped_at_total() {
        let mut contract = Contract::new(IdFixtures::deal("1"), TemporalFixtures::now());
        contract.total_amount = 100;
        contract.paid_amount = 100;
        let records = vec![
            PaymentRecord::paid(IdFixtures::payment("a"), IdFixtures::deal("1"), 80, PaymentSource::Cash, TemporalFixtures::now()),
            PaymentRecord::paid(IdFixtures::payment("b"), IdFixtures::deal("1"), 80, PaymentSource::Cash, TemporalFixtures::now()),
        ];
        assert_paid_matches_records(&contract, &records);
    }
}
