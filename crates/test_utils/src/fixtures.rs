//! Pre-built Test Fixtures
//!
//! Fixed timestamps, identifiers, and the reference contracts the ledger is
//! specified against. Everything here is deterministic.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use serde_json::json;

use core_kernel::{DealId, PaymentId, PortError};
use domain_crm::RawCrmDeal;
use domain_installment::{
    AllocationEntry, AllocationSlot, Contract, ContractStore, PaymentRecord, PaymentSource,
};

static FIXTURE_NOW: Lazy<DateTime<Utc>> =
    Lazy::new(|| Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap());

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// The instant every fixture is created at (Mar 5, 2024 12:00 UTC)
    pub fn now() -> DateTime<Utc> {
        *FIXTURE_NOW
    }

    /// Schedule anchor of anchored fixtures; day 5 precedes billing day 10
    pub fn anchor() -> NaiveDate {
        FIXTURE_NOW.date_naive()
    }

    /// Anchor on the billing day itself, pushing the first due date a month out
    pub fn anchor_on_billing_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
    }

    /// Anchor whose following months are shorter than the billing day
    pub fn end_of_january() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
    }
}

/// Fixture for identifiers
pub struct IdFixtures;

impl IdFixtures {
    pub fn deal(raw: &str) -> DealId {
        DealId::new(raw).unwrap()
    }

    pub fn payment(raw: &str) -> PaymentId {
        PaymentId::new(raw).unwrap()
    }
}

/// Fixture for CRM payloads in the shapes the CRM actually sends
pub struct CrmFixtures;

impl CrmFixtures {
    /// A deal with string amounts, a comma decimal, and thousands separators
    pub fn messy_deal(id: &str) -> RawCrmDeal {
        RawCrmDeal {
            id: json!(id),
            title: json!("Plot 14, phase 2"),
            opportunity: json!("300 000,00"),
            term_months: json!("6"),
            down_payment: json!(0),
            paid_amount: json!(""),
            begin_date: json!("2024-03-05T09:30:00+03:00"),
            date_created: json!("2024-03-01T10:00:00+03:00"),
            contact_email: json!("buyer@example.com"),
        }
    }

    /// A deal the CRM knows nothing useful about
    pub fn empty_deal(id: &str) -> RawCrmDeal {
        RawCrmDeal {
            id: json!(id),
            opportunity: json!(false),
            term_months: serde_json::Value::Null,
            ..RawCrmDeal::default()
        }
    }
}

/// A contract together with the ledger rows it starts with
#[derive(Debug, Clone)]
pub struct LedgerScenario {
    pub contract: Contract,
    pub payments: Vec<PaymentRecord>,
    pub allocations: Vec<AllocationEntry>,
}

impl LedgerScenario {
    fn bare(contract: Contract) -> Self {
        Self {
            contract,
            payments: Vec::new(),
            allocations: Vec::new(),
        }
    }

    pub fn deal_id(&self) -> &DealId {
        &self.contract.deal_id
    }

    /// Writes the scenario through one store transaction
    pub async fn load_into(&self, store: &dyn ContractStore) -> Result<(), PortError> {
        let mut tx = store.begin().await?;
        tx.insert_contract(&self.contract).await?;
        for payment in &self.payments {
            tx.insert_payment(payment).await?;
        }
        tx.insert_allocations(&self.allocations).await?;
        tx.commit().await
    }
}

/// The reference contracts
pub struct ScenarioFixtures;

impl ScenarioFixtures {
    fn anchored(id: &str, total: i64, down: i64, term: u32) -> Contract {
        let mut contract = Contract::new(IdFixtures::deal(id), TemporalFixtures::now());
        contract.total_amount = total;
        contract.down_payment = down;
        contract.term_months = term;
        contract.schedule_anchor_date = Some(TemporalFixtures::anchor());
        contract
    }

    /// 300000 over 6 months, no down payment: six installments of 50000
    pub fn even_split() -> LedgerScenario {
        LedgerScenario::bare(Self::anchored("1001", 300_000, 0, 6))
    }

    /// 100000 over 3 months: 33333, 33333, 33334
    pub fn remainder_on_last() -> LedgerScenario {
        LedgerScenario::bare(Self::anchored("1002", 100_000, 0, 3))
    }

    /// The even split after a 40000 gateway payment `p1`: month 0 is partial
    pub fn partial_first_month() -> LedgerScenario {
        let mut scenario = LedgerScenario::bare(Self::anchored("1003", 300_000, 0, 6));
        let deal_id = scenario.contract.deal_id.clone();
        let payment_id = IdFixtures::payment("p1");
        let now = TemporalFixtures::now();

        scenario.contract.paid_amount = 40_000;
        scenario.payments.push(PaymentRecord::paid(
            payment_id.clone(),
            deal_id.clone(),
            40_000,
            PaymentSource::Gateway,
            now,
        ));
        scenario.allocations.push(AllocationEntry {
            deal_id,
            payment_id,
            slot: AllocationSlot::Month(0),
            amount: 40_000,
            created_at: now,
        });
        scenario
    }

    /// Down payment covers the whole contract: empty schedule
    pub fn covered_by_down_payment() -> LedgerScenario {
        LedgerScenario::bare(Self::anchored("1004", 50_000, 50_000, 12))
    }

    /// Two months of 10000, the first fully allocated; only the last owes 10000
    pub fn last_month_open() -> LedgerScenario {
        let mut scenario = LedgerScenario::bare(Self::anchored("1005", 20_000, 0, 2));
        let deal_id = scenario.contract.deal_id.clone();
        let payment_id = IdFixtures::payment("p0");
        let now = TemporalFixtures::now();

        scenario.contract.paid_amount = 10_000;
        scenario.payments.push(PaymentRecord::paid(
            payment_id.clone(),
            deal_id.clone(),
            10_000,
            PaymentSource::Gateway,
            now,
        ));
        scenario.allocations.push(AllocationEntry {
            deal_id,
            payment_id,
            slot: AllocationSlot::Month(0),
            amount: 10_000,
            created_at: now,
        });
        scenario
    }

    /// Every reference scenario
    pub fn all() -> Vec<LedgerScenario> {
        vec![
            Self::even_split(),
            Self::remainder_on_last(),
            Self::partial_first_month(),
            Self::covered_by_down_payment(),
            Self::last_month_open(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_scenario_deals_are_distinct() {
        let ids: HashSet<_> = ScenarioFixtures::all()
            .iter()
            .map(|s| s.deal_id().clone())
            .collect();
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn test_seeded_rows_match_paid_amount() {
        for scenario in ScenarioFixtures::all() {
            let allocated: i64 = scenario.allocations.iter().map(|a| a.amount).sum();
            assert_eq!(allocated, scenario.contract.paid_amount);
        }
    }
}
