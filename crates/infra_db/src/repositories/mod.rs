//! Repository implementations
//!
//! Repositories encapsulate SQL queries and map between database rows and
//! plain row structs. Functions that must run under the reconciliation lock
//! take the transaction's connection explicitly.

pub mod installment;

pub use installment::{AllocationRow, ContractRow, InstallmentRepository, PaymentRow};
