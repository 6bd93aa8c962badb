//! Tests for the PostgreSQL store against a real database
//!
//! Each test starts its own container: `cargo test -p infra_db -- --ignored`

use std::sync::Arc;

use core_kernel::{FixedClock, PortError, RetryPolicy, SharedClock};
use domain_crm::MockCrmPort;
use domain_installment::{
    ContractStore, GatewayConfirmation, PaymentRecord, ReconciliationPolicy, ReconciliationService,
    TracingNotifier,
};
use infra_db::PostgresContractStore;
use test_utils::{
    assert_months_within_due, assert_paid_matches_records, assert_paid_within_total,
    create_isolated_test_database, CashRequestBuilder, ContractBuilder, IdFixtures,
    ScenarioFixtures, TemporalFixtures, TestDatabase,
};

async fn setup() -> (TestDatabase, Arc<PostgresContractStore>, Arc<ReconciliationService>) {
    let db = create_isolated_test_database()
        .await
        .expect("Failed to create test database");
    let store = Arc::new(PostgresContractStore::new(db.pool().clone()));
    let clock: SharedClock = Arc::new(FixedClock::new(TemporalFixtures::now()));
    let policy = ReconciliationPolicy {
        echo_retry: RetryPolicy::immediate(1),
        ..ReconciliationPolicy::default()
    };
    let service = ReconciliationService::new(
        store.clone(),
        Arc::new(MockCrmPort::new()),
        Arc::new(TracingNotifier),
        clock,
        policy,
    );
    (db, store, Arc::new(service))
}

// ============================================================================
// Store Tests
// ============================================================================

mod store_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn test_scenarios_round_trip() {
        let (_db, store, _service) = setup().await;

        for scenario in ScenarioFixtures::all() {
            scenario.load_into(store.as_ref()).await.unwrap();
            let stored = store.get_contract(scenario.deal_id()).await.unwrap().unwrap();
            assert_eq!(stored, scenario.contract);
            assert_eq!(
                store.list_allocations(scenario.deal_id()).await.unwrap(),
                scenario.allocations
            );
        }
        assert_eq!(store.list_contracts().await.unwrap().len(), 5);
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn test_payment_id_is_unique() {
        let (_db, store, _service) = setup().await;
        let contract = ContractBuilder::new().deal_id("200").build();
        let record = PaymentRecord::paid(
            IdFixtures::payment("dup-1"),
            contract.deal_id.clone(),
            100,
            domain_installment::PaymentSource::Cash,
            TemporalFixtures::now(),
        );

        let mut tx = store.begin().await.unwrap();
        tx.insert_contract(&contract).await.unwrap();
        tx.insert_payment(&record).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx.insert_payment(&record).await.unwrap_err();
        assert!(matches!(err, PortError::Conflict { .. }));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn test_check_constraint_rejects_overpaid_contract() {
        let (_db, store, _service) = setup().await;
        let contract = ContractBuilder::new().deal_id("201").total(100).build();

        let mut tx = store.begin().await.unwrap();
        tx.insert_contract(&contract).await.unwrap();
        let mut overpaid = contract.clone();
        overpaid.paid_amount = 150;
        assert!(tx.save_contract(&overpaid).await.is_err());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn test_readiness() {
        let (_db, store, _service) = setup().await;
        let result = core_kernel::HealthCheckable::health_check(store.as_ref()).await;
        assert_eq!(result.status, core_kernel::AdapterHealth::Healthy);
    }
}

// ============================================================================
// Reconciliation Tests
// ============================================================================

mod reconciliation_tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn test_overpayment_lands_on_last_month() {
        let (_db, store, service) = setup().await;
        let scenario = ScenarioFixtures::last_month_open();
        scenario.load_into(store.as_ref()).await.unwrap();

        let outcome = service
            .confirm_gateway_payment(&GatewayConfirmation {
                deal_id: scenario.deal_id().clone(),
                payment_id: IdFixtures::payment("p-over"),
                amount: 15_000,
            })
            .await
            .unwrap();
        assert_eq!(outcome.new_paid, 20_000);

        let contract = store.get_contract(scenario.deal_id()).await.unwrap().unwrap();
        assert_paid_within_total(&contract);
        let entries = store.list_allocations(scenario.deal_id()).await.unwrap();
        assert_months_within_due(&entries, &[10_000, 10_000]);
        let last_month: i64 = entries
            .iter()
            .filter(|e| e.slot.month() == Some(1))
            .map(|e| e.amount)
            .sum();
        assert_eq!(last_month, 15_000);
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn test_concurrent_confirmations_apply_once() {
        let (_db, store, service) = setup().await;
        let scenario = ScenarioFixtures::even_split();
        scenario.load_into(store.as_ref()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = service.clone();
            let confirmation = GatewayConfirmation {
                deal_id: scenario.deal_id().clone(),
                payment_id: IdFixtures::payment("p-race"),
                amount: 40_000,
            };
            handles.push(tokio::spawn(async move {
                service.confirm_gateway_payment(&confirmation).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let contract = store.get_contract(scenario.deal_id()).await.unwrap().unwrap();
        assert_eq!(contract.paid_amount, 40_000);
        let records = store.list_payments(scenario.deal_id()).await.unwrap();
        assert_paid_matches_records(&contract, &records);
        let entries = store.list_allocations(scenario.deal_id()).await.unwrap();
        assert_eq!(entries.iter().map(|e| e.amount).sum::<i64>(), 40_000);
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn test_first_sight_is_created_once() {
        let (_db, store, service) = setup().await;

        let mut handles = Vec::new();
        for i in 0..4 {
            let service = service.clone();
            let confirmation = GatewayConfirmation {
                deal_id: IdFixtures::deal("300"),
                payment_id: IdFixtures::payment(&format!("p-first-{}", i)),
                amount: 1_000,
            };
            handles.push(tokio::spawn(async move {
                service.confirm_gateway_payment(&confirmation).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let contract = store.get_contract(&IdFixtures::deal("300")).await.unwrap().unwrap();
        assert_eq!(contract.total_amount, 0);
        assert_eq!(contract.paid_amount, 4_000);
    }

    #[tokio::test]
    #[ignore = "requires a container runtime"]
    async fn test_cash_idempotency_key_survives_in_database() {
        let (_db, store, service) = setup().await;
        let scenario = test_utils::LedgerScenario {
            contract: ContractBuilder::new().deal_id("400").build(),
            payments: Vec::new(),
            allocations: Vec::new(),
        };
        scenario.load_into(store.as_ref()).await.unwrap();

        let request = CashRequestBuilder::lump(scenario.deal_id(), 15_000).key("till-9").build();
        let first = service.record_cash_payment(&request).await.unwrap();
        let replay = service.record_cash_payment(&request).await.unwrap();
        assert!(!first.idempotent);
        assert!(replay.idempotent);
        assert_eq!(replay.new_paid, 15_000);
    }
}
