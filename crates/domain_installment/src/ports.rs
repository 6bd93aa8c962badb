//! Installment Domain Ports
//!
//! The reconciliation engine depends on two ports:
//!
//! - `ContractStore` / `LedgerTransaction`: durable storage of contracts,
//!   payment records, and allocation entries. Every mutation happens inside a
//!   `LedgerTransaction` that holds an exclusive per-deal lock from
//!   `lock_contract` until `commit` or `rollback`. Dropping a transaction
//!   without committing discards it.
//! - `NotificationPort`: best-effort delivery of payment notices after commit.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut tx = store.begin().await?;
//! let contract = tx.lock_contract(&deal_id).await?;
//! // read-check-mutate under the lock
//! tx.save_contract(&contract).await?;
//! tx.commit().await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{DealId, DomainPort, HealthCheckable, PaymentId, PortError};

use crate::allocation::AllocationEntry;
use crate::contract::Contract;
use crate::payment::{PaymentRecord, PaymentSource};

/// Read access to stored ledger state and the entry point for transactions
#[async_trait]
pub trait ContractStore: DomainPort + HealthCheckable {
    /// Opens a transaction
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, PortError>;

    /// Reads a contract without locking it
    async fn get_contract(&self, deal_id: &DealId) -> Result<Option<Contract>, PortError>;

    /// All contracts, most recently updated first
    async fn list_contracts(&self) -> Result<Vec<Contract>, PortError>;

    /// Payment records of a deal, newest first
    async fn list_payments(&self, deal_id: &DealId) -> Result<Vec<PaymentRecord>, PortError>;

    /// Allocation entries of a deal in creation order
    async fn list_allocations(&self, deal_id: &DealId) -> Result<Vec<AllocationEntry>, PortError>;
}

/// A unit of work over ledger state
///
/// Writes become visible to other transactions only on `commit`. Payment ids
/// are unique across all deals; inserting a duplicate fails with
/// `PortError::Conflict`.
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Locks a deal for the rest of the transaction and reads its contract
    ///
    /// The lock is taken even when the contract does not exist yet, where the
    /// store supports it, so that first-sight creation is serialized too.
    async fn lock_contract(&mut self, deal_id: &DealId) -> Result<Option<Contract>, PortError>;

    /// Inserts a contract unless one already exists
    ///
    /// # Returns
    ///
    /// true if this call created it
    async fn insert_contract(&mut self, contract: &Contract) -> Result<bool, PortError>;

    async fn save_contract(&mut self, contract: &Contract) -> Result<(), PortError>;

    async fn find_payment(&mut self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>, PortError>;

    async fn insert_payment(&mut self, record: &PaymentRecord) -> Result<(), PortError>;

    async fn save_payment(&mut self, record: &PaymentRecord) -> Result<(), PortError>;

    /// Returns true if any allocation entry references the payment
    async fn has_allocations(&mut self, payment_id: &PaymentId) -> Result<bool, PortError>;

    async fn deal_allocations(&mut self, deal_id: &DealId) -> Result<Vec<AllocationEntry>, PortError>;

    async fn insert_allocations(&mut self, entries: &[AllocationEntry]) -> Result<(), PortError>;

    /// Returns true if the deal has a payment of `amount` from `source` created at or after `since`
    async fn recent_payment_exists(
        &mut self,
        deal_id: &DealId,
        amount: i64,
        source: PaymentSource,
        since: DateTime<Utc>,
    ) -> Result<bool, PortError>;

    async fn commit(self: Box<Self>) -> Result<(), PortError>;

    async fn rollback(self: Box<Self>) -> Result<(), PortError>;
}

/// A committed payment, as announced to people
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotice {
    pub deal_id: DealId,
    pub payment_id: PaymentId,
    pub title: String,
    pub amount: i64,
    pub source: PaymentSource,
    pub paid_amount: i64,
    pub total_amount: i64,
}

/// Outbound payment notifications
#[async_trait]
pub trait NotificationPort: DomainPort {
    async fn payment_recorded(&self, notice: &PaymentNotice) -> Result<(), PortError>;
}

/// Mock implementation of NotificationPort for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// Records every notice it is given
    #[derive(Debug, Default, Clone)]
    pub struct RecordingNotifier {
        notices: Arc<RwLock<Vec<PaymentNotice>>>,
        failing: Arc<AtomicU32>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        /// Makes the next `count` deliveries fail
        pub fn fail_next(&self, count: u32) {
            self.failing.store(count, Ordering::SeqCst);
        }

        pub async fn notices(&self) -> Vec<PaymentNotice> {
            self.notices.read().await.clone()
        }
    }

    impl DomainPort for RecordingNotifier {}

    #[async_trait]
    impl NotificationPort for RecordingNotifier {
        async fn payment_recorded(&self, notice: &PaymentNotice) -> Result<(), PortError> {
            let failed = self
                .failing
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failed {
                return Err(PortError::ServiceUnavailable {
                    service: "mock notifier".to_string(),
                });
            }
            self.notices.write().await.push(notice.clone());
            Ok(())
        }
    }
}
