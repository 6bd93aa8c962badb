//! In-memory ledger store
//!
//! Keeps contracts, payment records, and allocation entries in process
//! memory. Per-deal exclusion uses one async mutex per deal id, held by the
//! transaction until it commits or is dropped; writes are staged in the
//! transaction and applied in one step on commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use core_kernel::{DealId, DomainPort, HealthCheckResult, HealthCheckable, PaymentId, PortError};

use crate::allocation::AllocationEntry;
use crate::contract::Contract;
use crate::payment::{PaymentRecord, PaymentSource};
use crate::ports::{ContractStore, LedgerTransaction};

#[derive(Debug, Default)]
struct LedgerState {
    contracts: HashMap<DealId, Contract>,
    payments: Vec<PaymentRecord>,
    allocations: Vec<AllocationEntry>,
}

impl LedgerState {
    fn payment(&self, payment_id: &PaymentId) -> Option<&PaymentRecord> {
        self.payments.iter().find(|p| &p.payment_id == payment_id)
    }
}

/// A `ContractStore` backed by process memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryContractStore {
    state: Arc<RwLock<LedgerState>>,
    deal_locks: Arc<Mutex<HashMap<DealId, Arc<Mutex<()>>>>>,
    failing_commits: Arc<AtomicU32>,
}

impl InMemoryContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a contract directly, bypassing transactions
    pub async fn seed_contract(&self, contract: Contract) {
        self.state
            .write()
            .await
            .contracts
            .insert(contract.deal_id.clone(), contract);
    }

    /// Makes the next `count` commits fail, leaving state untouched
    pub fn fail_next_commits(&self, count: u32) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Every allocation entry of every deal
    pub async fn all_allocations(&self) -> Vec<AllocationEntry> {
        self.state.read().await.allocations.clone()
    }

    /// Mutex of a deal; entries nobody holds or waits on are dropped here
    async fn deal_lock(&self, deal_id: &DealId) -> Arc<Mutex<()>> {
        let mut locks = self.deal_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(deal_id.clone()).or_default().clone()
    }
}

impl DomainPort for InMemoryContractStore {}

#[async_trait]
impl HealthCheckable for InMemoryContractStore {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("memory-contract-store")
    }
}

#[async_trait]
impl ContractStore for InMemoryContractStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, PortError> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            guards: HashMap::new(),
            contracts: HashMap::new(),
            payments: Vec::new(),
            inserted_payments: HashSet::new(),
            allocations: Vec::new(),
        }))
    }

    async fn get_contract(&self, deal_id: &DealId) -> Result<Option<Contract>, PortError> {
        Ok(self.state.read().await.contracts.get(deal_id).cloned())
    }

    async fn list_contracts(&self) -> Result<Vec<Contract>, PortError> {
        let mut contracts: Vec<Contract> = self.state.read().await.contracts.values().cloned().collect();
        contracts.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.deal_id.cmp(&b.deal_id))
        });
        Ok(contracts)
    }

    async fn list_payments(&self, deal_id: &DealId) -> Result<Vec<PaymentRecord>, PortError> {
        let mut payments: Vec<PaymentRecord> = self
            .state
            .read()
            .await
            .payments
            .iter()
            .rev()
            .filter(|p| &p.deal_id == deal_id)
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    async fn list_allocations(&self, deal_id: &DealId) -> Result<Vec<AllocationEntry>, PortError> {
        Ok(self
            .state
            .read()
            .await
            .allocations
            .iter()
            .filter(|a| &a.deal_id == deal_id)
            .cloned()
            .collect())
    }
}

/// Transaction over `InMemoryContractStore`
pub struct MemoryTransaction {
    store: InMemoryContractStore,
    guards: HashMap<DealId, OwnedMutexGuard<()>>,
    contracts: HashMap<DealId, Contract>,
    payments: Vec<PaymentRecord>,
    inserted_payments: HashSet<PaymentId>,
    allocations: Vec<AllocationEntry>,
}

impl MemoryTransaction {
    fn staged_payment(&self, payment_id: &PaymentId) -> Option<&PaymentRecord> {
        self.payments.iter().rev().find(|p| &p.payment_id == payment_id)
    }

    fn stage_payment(&mut self, record: &PaymentRecord) {
        match self.payments.iter_mut().find(|p| p.payment_id == record.payment_id) {
            Some(existing) => *existing = record.clone(),
            None => self.payments.push(record.clone()),
        }
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn lock_contract(&mut self, deal_id: &DealId) -> Result<Option<Contract>, PortError> {
        if !self.guards.contains_key(deal_id) {
            let lock = self.store.deal_lock(deal_id).await;
            let guard = lock.lock_owned().await;
            self.guards.insert(deal_id.clone(), guard);
        }

        if let Some(staged) = self.contracts.get(deal_id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.state.read().await.contracts.get(deal_id).cloned())
    }

    async fn insert_contract(&mut self, contract: &Contract) -> Result<bool, PortError> {
        let exists = self.contracts.contains_key(&contract.deal_id)
            || self
                .store
                .state
                .read()
                .await
                .contracts
                .contains_key(&contract.deal_id);
        if exists {
            return Ok(false);
        }
        self.contracts.insert(contract.deal_id.clone(), contract.clone());
        Ok(true)
    }

    async fn save_contract(&mut self, contract: &Contract) -> Result<(), PortError> {
        self.contracts.insert(contract.deal_id.clone(), contract.clone());
        Ok(())
    }

    async fn find_payment(&mut self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>, PortError> {
        if let Some(staged) = self.staged_payment(payment_id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.state.read().await.payment(payment_id).cloned())
    }

    async fn insert_payment(&mut self, record: &PaymentRecord) -> Result<(), PortError> {
        let duplicate = self.staged_payment(&record.payment_id).is_some()
            || self.store.state.read().await.payment(&record.payment_id).is_some();
        if duplicate {
            return Err(PortError::conflict(format!(
                "payment {} already exists",
                record.payment_id
            )));
        }
        self.inserted_payments.insert(record.payment_id.clone());
        self.payments.push(record.clone());
        Ok(())
    }

    async fn save_payment(&mut self, record: &PaymentRecord) -> Result<(), PortError> {
        self.stage_payment(record);
        Ok(())
    }

    async fn has_allocations(&mut self, payment_id: &PaymentId) -> Result<bool, PortError> {
        if self.allocations.iter().any(|a| &a.payment_id == payment_id) {
            return Ok(true);
        }
        Ok(self
            .store
            .state
            .read()
            .await
            .allocations
            .iter()
            .any(|a| &a.payment_id == payment_id))
    }

    async fn deal_allocations(&mut self, deal_id: &DealId) -> Result<Vec<AllocationEntry>, PortError> {
        let mut entries: Vec<AllocationEntry> = self
            .store
            .state
            .read()
            .await
            .allocations
            .iter()
            .filter(|a| &a.deal_id == deal_id)
            .cloned()
            .collect();
        entries.extend(self.allocations.iter().filter(|a| &a.deal_id == deal_id).cloned());
        Ok(entries)
    }

    async fn insert_allocations(&mut self, entries: &[AllocationEntry]) -> Result<(), PortError> {
        self.allocations.extend_from_slice(entries);
        Ok(())
    }

    async fn recent_payment_exists(
        &mut self,
        deal_id: &DealId,
        amount: i64,
        source: PaymentSource,
        since: DateTime<Utc>,
    ) -> Result<bool, PortError> {
        let matches = |p: &PaymentRecord| {
            &p.deal_id == deal_id && p.amount == amount && p.source == source && p.created_at >= since
        };
        if self.payments.iter().any(matches) {
            return Ok(true);
        }
        Ok(self.store.state.read().await.payments.iter().any(matches))
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        let injected = self
            .store
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(PortError::internal("injected commit failure"));
        }

        let this = *self;
        let mut state = this.store.state.write().await;

        for payment_id in &this.inserted_payments {
            if state.payment(payment_id).is_some() {
                return Err(PortError::conflict(format!(
                    "payment {} already exists",
                    payment_id
                )));
            }
        }

        for (deal_id, contract) in this.contracts {
            state.contracts.insert(deal_id, contract);
        }
        for record in this.payments {
            match state.payments.iter_mut().find(|p| p.payment_id == record.payment_id) {
                Some(existing) => *existing = record,
                None => state.payments.push(record),
            }
        }
        state.allocations.extend(this.allocations);

        debug!(locks = this.guards.len(), "Memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortError> {
        Ok(())
    }
}
