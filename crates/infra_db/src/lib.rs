//! Infrastructure Database Layer
//!
//! PostgreSQL storage for the installment ledger using SQLx.
//!
//! # Architecture
//!
//! The crate follows the repository pattern: repositories own the SQL and the
//! row types, adapters implement the domain's `ContractStore` port on top of
//! them and translate rows into domain values.
//!
//! # Locking
//!
//! Every ledger mutation runs in one transaction that first takes a
//! transaction-scoped advisory lock on the deal id and then reads the contract
//! row `FOR UPDATE`. Both are released on commit or rollback. Payment ids are
//! protected by a unique constraint, so a replayed confirmation can never
//! insert a second record.
//!
//! # Example
//!
//! ```rust,ignore
//! use infra_db::{create_pool, run_migrations, DatabaseConfig, PostgresContractStore};
//!
//! let pool = create_pool(DatabaseConfig::new("postgres://localhost/installments")).await?;
//! run_migrations(&pool).await?;
//! let store = PostgresContractStore::new(pool);
//! ```

pub mod pool;
pub mod error;
pub mod repositories;
pub mod adapters;

pub use pool::{DatabasePool, create_pool, run_migrations, DatabaseConfig};
pub use error::DatabaseError;
pub use adapters::{PostgresContractStore, PostgresLedgerTransaction};
