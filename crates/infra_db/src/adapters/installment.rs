//! PostgreSQL Ledger Adapter
//!
//! Implements `ContractStore` and `LedgerTransaction` over the
//! `InstallmentRepository`. A `PostgresLedgerTransaction` wraps one SQLx
//! transaction; dropping it without `commit` rolls back and releases the row
//! and advisory locks it holds.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresContractStore;
//! use domain_installment::ContractStore;
//! use std::sync::Arc;
//!
//! let store: Arc<dyn ContractStore> = Arc::new(PostgresContractStore::new(pool));
//! let mut tx = store.begin().await?;
//! let contract = tx.lock_contract(&deal_id).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::str::FromStr;
use tracing::{debug, instrument};

use core_kernel::{
    AdapterHealth, DealId, DomainPort, HealthCheckResult, HealthCheckable, PaymentId, PortError,
};
use domain_installment::{
    AllocationEntry, AllocationSlot, Contract, ContractStore, LedgerTransaction, PaymentRecord,
    PaymentSource, PaymentStatus,
};

use crate::error::DatabaseError;
use crate::repositories::installment::{AllocationRow, ContractRow, InstallmentRepository, PaymentRow};

/// PostgreSQL-backed implementation of `ContractStore`
#[derive(Debug, Clone)]
pub struct PostgresContractStore {
    repository: InstallmentRepository,
}

impl PostgresContractStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: InstallmentRepository::new(pool),
        }
    }

    pub fn repository(&self) -> &InstallmentRepository {
        &self.repository
    }
}

impl DomainPort for PostgresContractStore {}

#[async_trait]
impl HealthCheckable for PostgresContractStore {
    /// Performs a `SELECT 1` round trip
    async fn health_check(&self) -> HealthCheckResult {
        let start = std::time::Instant::now();
        let result = self.repository.ping().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let (status, message) = match result {
            Ok(()) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("Database error: {}", e))),
        };
        HealthCheckResult {
            adapter_id: "postgres-contract-store".to_string(),
            status,
            latency_ms,
            message,
            checked_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ContractStore for PostgresContractStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, PortError> {
        let tx = self.repository.begin().await?;
        Ok(Box::new(PostgresLedgerTransaction { tx }))
    }

    #[instrument(skip(self), fields(deal_id = %deal_id))]
    async fn get_contract(&self, deal_id: &DealId) -> Result<Option<Contract>, PortError> {
        let row = self.repository.find_contract(deal_id.as_str()).await?;
        Ok(row.map(contract_from_row).transpose()?)
    }

    async fn list_contracts(&self) -> Result<Vec<Contract>, PortError> {
        let rows = self.repository.list_contracts().await?;
        Ok(rows
            .into_iter()
            .map(contract_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    #[instrument(skip(self), fields(deal_id = %deal_id))]
    async fn list_payments(&self, deal_id: &DealId) -> Result<Vec<PaymentRecord>, PortError> {
        let rows = self.repository.list_payments(deal_id.as_str()).await?;
        Ok(rows
            .into_iter()
            .map(payment_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    #[instrument(skip(self), fields(deal_id = %deal_id))]
    async fn list_allocations(&self, deal_id: &DealId) -> Result<Vec<AllocationEntry>, PortError> {
        let rows = self.repository.list_allocations(deal_id.as_str()).await?;
        Ok(rows
            .into_iter()
            .map(allocation_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

/// One SQLx transaction on the ledger tables
pub struct PostgresLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PostgresLedgerTransaction {
    #[instrument(skip(self), fields(deal_id = %deal_id))]
    async fn lock_contract(&mut self, deal_id: &DealId) -> Result<Option<Contract>, PortError> {
        let row = InstallmentRepository::lock_contract(&mut self.tx, deal_id.as_str()).await?;
        debug!(found = row.is_some(), "Deal locked");
        Ok(row.map(contract_from_row).transpose()?)
    }

    async fn insert_contract(&mut self, contract: &Contract) -> Result<bool, PortError> {
        Ok(InstallmentRepository::insert_contract(&mut self.tx, &contract_to_row(contract)).await?)
    }

    async fn save_contract(&mut self, contract: &Contract) -> Result<(), PortError> {
        Ok(InstallmentRepository::update_contract(&mut self.tx, &contract_to_row(contract)).await?)
    }

    async fn find_payment(&mut self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>, PortError> {
        let row = InstallmentRepository::find_payment(&mut self.tx, payment_id.as_str()).await?;
        Ok(row.map(payment_from_row).transpose()?)
    }

    #[instrument(skip(self, record), fields(payment_id = %record.payment_id))]
    async fn insert_payment(&mut self, record: &PaymentRecord) -> Result<(), PortError> {
        Ok(InstallmentRepository::insert_payment(&mut self.tx, &payment_to_row(record)).await?)
    }

    async fn save_payment(&mut self, record: &PaymentRecord) -> Result<(), PortError> {
        Ok(InstallmentRepository::update_payment(&mut self.tx, &payment_to_row(record)).await?)
    }

    async fn has_allocations(&mut self, payment_id: &PaymentId) -> Result<bool, PortError> {
        Ok(InstallmentRepository::payment_has_allocations(&mut self.tx, payment_id.as_str()).await?)
    }

    async fn deal_allocations(&mut self, deal_id: &DealId) -> Result<Vec<AllocationEntry>, PortError> {
        let rows = InstallmentRepository::deal_allocations(&mut self.tx, deal_id.as_str()).await?;
        Ok(rows
            .into_iter()
            .map(allocation_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn insert_allocations(&mut self, entries: &[AllocationEntry]) -> Result<(), PortError> {
        let rows: Vec<AllocationRow> = entries.iter().map(allocation_to_row).collect();
        Ok(InstallmentRepository::insert_allocations(&mut self.tx, &rows).await?)
    }

    async fn recent_payment_exists(
        &mut self,
        deal_id: &DealId,
        amount: i64,
        source: PaymentSource,
        since: DateTime<Utc>,
    ) -> Result<bool, PortError> {
        Ok(InstallmentRepository::recent_payment_exists(
            &mut self.tx,
            deal_id.as_str(),
            amount,
            source.as_str(),
            since,
        )
        .await?)
    }

    async fn commit(self: Box<Self>) -> Result<(), PortError> {
        self.tx
            .commit()
            .await
            .map_err(|e| PortError::from(DatabaseError::TransactionFailed(e.to_string())))
    }

    async fn rollback(self: Box<Self>) -> Result<(), PortError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| PortError::from(DatabaseError::TransactionFailed(e.to_string())))
    }
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::CorruptRow(format!("{}: {}", what, detail))
}

fn contract_from_row(row: ContractRow) -> Result<Contract, DatabaseError> {
    Ok(Contract {
        deal_id: DealId::new(row.deal_id).map_err(|e| corrupt("contracts.deal_id", e))?,
        title: row.title,
        contact_email: row.contact_email,
        total_amount: row.total_amount,
        paid_amount: row.paid_amount,
        down_payment: row.down_payment,
        term_months: u32::try_from(row.term_months).map_err(|e| corrupt("contracts.term_months", e))?,
        schedule_anchor_date: row.schedule_anchor_date,
        billing_day: u32::try_from(row.billing_day).map_err(|e| corrupt("contracts.billing_day", e))?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

fn contract_to_row(contract: &Contract) -> ContractRow {
    ContractRow {
        deal_id: contract.deal_id.as_str().to_string(),
        title: contract.title.clone(),
        contact_email: contract.contact_email.clone(),
        total_amount: contract.total_amount,
        paid_amount: contract.paid_amount,
        down_payment: contract.down_payment,
        term_months: contract.term_months as i32,
        schedule_anchor_date: contract.schedule_anchor_date,
        billing_day: contract.billing_day as i32,
        created_at: contract.created_at,
        updated_at: contract.updated_at,
    }
}

fn payment_from_row(row: PaymentRow) -> Result<PaymentRecord, DatabaseError> {
    Ok(PaymentRecord {
        payment_id: PaymentId::new(row.payment_id).map_err(|e| corrupt("payment_records.payment_id", e))?,
        deal_id: DealId::new(row.deal_id).map_err(|e| corrupt("payment_records.deal_id", e))?,
        amount: row.amount,
        status: PaymentStatus::from_str(&row.status).map_err(|e| corrupt("payment_records.status", e))?,
        source: PaymentSource::from_str(&row.source).map_err(|e| corrupt("payment_records.source", e))?,
        comment: row.comment,
        created_at: row.created_at,
        paid_at: row.paid_at,
    })
}

fn payment_to_row(record: &PaymentRecord) -> PaymentRow {
    PaymentRow {
        payment_id: record.payment_id.as_str().to_string(),
        deal_id: record.deal_id.as_str().to_string(),
        amount: record.amount,
        status: record.status.as_str().to_string(),
        source: record.source.as_str().to_string(),
        comment: record.comment.clone(),
        created_at: record.created_at,
        paid_at: record.paid_at,
    }
}

fn allocation_from_row(row: AllocationRow) -> Result<AllocationEntry, DatabaseError> {
    Ok(AllocationEntry {
        deal_id: DealId::new(row.deal_id).map_err(|e| corrupt("allocation_entries.deal_id", e))?,
        payment_id: PaymentId::new(row.payment_id)
            .map_err(|e| corrupt("allocation_entries.payment_id", e))?,
        slot: AllocationSlot::from_index(row.month_index),
        amount: row.amount,
        created_at: row.created_at,
    })
}

fn allocation_to_row(entry: &AllocationEntry) -> AllocationRow {
    AllocationRow {
        deal_id: entry.deal_id.as_str().to_string(),
        payment_id: entry.payment_id.as_str().to_string(),
        month_index: entry.slot.to_index(),
        amount: entry.amount,
        created_at: entry.created_at,
    }
}
