//! Domain Adapters
//!
//! Implementations of domain ports on top of the repositories.
//!
//! # Usage
//!
//! ```rust,ignore
//! use infra_db::adapters::PostgresContractStore;
//! use domain_installment::ContractStore;
//!
//! let store = PostgresContractStore::new(pool);
//! let contract = store.get_contract(&deal_id).await?;
//! ```

pub mod installment;

pub use installment::{PostgresContractStore, PostgresLedgerTransaction};
