//! Installment ledger repository
//!
//! SQL access to `contracts`, `payment_records`, and `allocation_entries`.
//! Reads that need no lock go through the pool. Everything on the
//! reconciliation path takes a `&mut PgConnection` so it runs inside the
//! caller's transaction.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};

use crate::error::DatabaseError;

const CONTRACT_COLUMNS: &str = "deal_id, title, contact_email, total_amount, paid_amount, \
    down_payment, term_months, schedule_anchor_date, billing_day, created_at, updated_at";

const PAYMENT_COLUMNS: &str =
    "payment_id, deal_id, amount, status, source, comment, created_at, paid_at";

const ALLOCATION_COLUMNS: &str = "deal_id, payment_id, month_index, amount, created_at";

/// Repository for contracts, payment records, and allocation entries
#[derive(Debug, Clone)]
pub struct InstallmentRepository {
    pool: PgPool,
}

impl InstallmentRepository {
    /// Creates a new InstallmentRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Opens a transaction on the pool
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, DatabaseError> {
        self.pool
            .begin()
            .await
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }

    /// Round-trips a trivial query
    pub async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_contract(&self, deal_id: &str) -> Result<Option<ContractRow>, DatabaseError> {
        let row = sqlx::query_as::<_, ContractRow>(&format!(
            "SELECT {} FROM contracts WHERE deal_id = $1",
            CONTRACT_COLUMNS
        ))
        .bind(deal_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// All contracts, most recently updated first
    pub async fn list_contracts(&self) -> Result<Vec<ContractRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, ContractRow>(&format!(
            "SELECT {} FROM contracts ORDER BY updated_at DESC, deal_id",
            CONTRACT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Payment records of a deal, newest first
    pub async fn list_payments(&self, deal_id: &str) -> Result<Vec<PaymentRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payment_records WHERE deal_id = $1 ORDER BY created_at DESC, id DESC",
            PAYMENT_COLUMNS
        ))
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Allocation entries of a deal in insertion order
    pub async fn list_allocations(&self, deal_id: &str) -> Result<Vec<AllocationRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AllocationRow>(&format!(
            "SELECT {} FROM allocation_entries WHERE deal_id = $1 ORDER BY id",
            ALLOCATION_COLUMNS
        ))
        .bind(deal_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Locks a deal for the rest of the transaction and reads its contract
    ///
    /// A transaction-scoped advisory lock on the deal id serializes first-sight
    /// creation, where no row exists yet to lock. The row itself is then read
    /// `FOR UPDATE`.
    pub async fn lock_contract(
        conn: &mut PgConnection,
        deal_id: &str,
    ) -> Result<Option<ContractRow>, DatabaseError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(deal_id)
            .execute(&mut *conn)
            .await?;

        let row = sqlx::query_as::<_, ContractRow>(&format!(
            "SELECT {} FROM contracts WHERE deal_id = $1 FOR UPDATE",
            CONTRACT_COLUMNS
        ))
        .bind(deal_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Inserts a contract unless the deal already has one
    ///
    /// # Returns
    ///
    /// true if a row was inserted
    pub async fn insert_contract(conn: &mut PgConnection, row: &ContractRow) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            INSERT INTO contracts (
                deal_id, title, contact_email, total_amount, paid_amount, down_payment,
                term_months, schedule_anchor_date, billing_day, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (deal_id) DO NOTHING
            "#,
        )
        .bind(&row.deal_id)
        .bind(&row.title)
        .bind(&row.contact_email)
        .bind(row.total_amount)
        .bind(row.paid_amount)
        .bind(row.down_payment)
        .bind(row.term_months)
        .bind(row.schedule_anchor_date)
        .bind(row.billing_day)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn update_contract(conn: &mut PgConnection, row: &ContractRow) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE contracts SET
                title = $2,
                contact_email = $3,
                total_amount = $4,
                paid_amount = $5,
                down_payment = $6,
                term_months = $7,
                schedule_anchor_date = $8,
                billing_day = $9,
                updated_at = $10
            WHERE deal_id = $1
            "#,
        )
        .bind(&row.deal_id)
        .bind(&row.title)
        .bind(&row.contact_email)
        .bind(row.total_amount)
        .bind(row.paid_amount)
        .bind(row.down_payment)
        .bind(row.term_months)
        .bind(row.schedule_anchor_date)
        .bind(row.billing_day)
        .bind(row.updated_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Deal", &row.deal_id));
        }
        Ok(())
    }

    pub async fn find_payment(
        conn: &mut PgConnection,
        payment_id: &str,
    ) -> Result<Option<PaymentRow>, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payment_records WHERE payment_id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(row)
    }

    /// Inserts a payment record
    ///
    /// # Errors
    ///
    /// `DatabaseError::DuplicateEntry` if the payment id is taken
    pub async fn insert_payment(conn: &mut PgConnection, row: &PaymentRow) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO payment_records (
                payment_id, deal_id, amount, status, source, comment, created_at, paid_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&row.payment_id)
        .bind(&row.deal_id)
        .bind(row.amount)
        .bind(&row.status)
        .bind(&row.source)
        .bind(&row.comment)
        .bind(row.created_at)
        .bind(row.paid_at)
        .execute(&mut *conn)
        .await
        .map_err(|e| match DatabaseError::from(e) {
            DatabaseError::DuplicateEntry(_) => {
                DatabaseError::duplicate("Payment", "payment_id", &row.payment_id)
            }
            other => other,
        })?;
        Ok(())
    }

    pub async fn update_payment(conn: &mut PgConnection, row: &PaymentRow) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_records SET
                amount = $2,
                status = $3,
                comment = $4,
                paid_at = $5
            WHERE payment_id = $1
            "#,
        )
        .bind(&row.payment_id)
        .bind(row.amount)
        .bind(&row.status)
        .bind(&row.comment)
        .bind(row.paid_at)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::not_found("Payment", &row.payment_id));
        }
        Ok(())
    }

    pub async fn payment_has_allocations(conn: &mut PgConnection, payment_id: &str) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM allocation_entries WHERE payment_id = $1)",
        )
        .bind(payment_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }

    pub async fn deal_allocations(
        conn: &mut PgConnection,
        deal_id: &str,
    ) -> Result<Vec<AllocationRow>, DatabaseError> {
        let rows = sqlx::query_as::<_, AllocationRow>(&format!(
            "SELECT {} FROM allocation_entries WHERE deal_id = $1 ORDER BY id",
            ALLOCATION_COLUMNS
        ))
        .bind(deal_id)
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }

    pub async fn insert_allocations(conn: &mut PgConnection, rows: &[AllocationRow]) -> Result<(), DatabaseError> {
        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO allocation_entries (deal_id, payment_id, month_index, amount, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&row.deal_id)
            .bind(&row.payment_id)
            .bind(row.month_index)
            .bind(row.amount)
            .bind(row.created_at)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Checks for a payment of the same amount and source on the deal since `since`
    pub async fn recent_payment_exists(
        conn: &mut PgConnection,
        deal_id: &str,
        amount: i64,
        source: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM payment_records
                WHERE deal_id = $1 AND amount = $2 AND source = $3 AND created_at >= $4
            )
            "#,
        )
        .bind(deal_id)
        .bind(amount)
        .bind(source)
        .bind(since)
        .fetch_one(&mut *conn)
        .await?;
        Ok(exists)
    }
}

/// Database row for a contract
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct ContractRow {
    pub deal_id: String,
    pub title: String,
    pub contact_email: Option<String>,
    pub total_amount: i64,
    pub paid_amount: i64,
    pub down_payment: i64,
    pub term_months: i32,
    pub schedule_anchor_date: Option<NaiveDate>,
    pub billing_day: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Database row for a payment record
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PaymentRow {
    pub payment_id: String,
    pub deal_id: String,
    pub amount: i64,
    pub status: String,
    pub source: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Database row for an allocation entry
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct AllocationRow {
    pub deal_id: String,
    pub payment_id: String,
    /// -1 for the down-payment slot
    pub month_index: i32,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}
