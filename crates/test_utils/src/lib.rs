//! Test Utilities Crate
//!
//! Shared test infrastructure, fixtures, and helpers for the installment
//! ledger test suite.
//!
//! # Modules
//!
//! - `fixtures`: The reference contracts, fixed timestamps, CRM payloads
//! - `builders`: Builders for contracts, webhooks, and cash entries
//! - `database`: PostgreSQL test containers with the schema applied
//! - `assertions`: Ledger invariant checks
//! - `generators`: Property-based test data generators

pub mod fixtures;
pub mod builders;
pub mod database;
pub mod assertions;
pub mod generators;

pub use fixtures::*;
pub use builders::*;
pub use database::*;
pub use assertions::*;
pub use generators::*;
