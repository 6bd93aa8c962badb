//! Installment adapters
//!
//! - `InMemoryContractStore`: ledger storage in process memory
//! - `TracingNotifier`: payment notices as log events

pub mod memory;
pub mod notifier;

pub use memory::{InMemoryContractStore, MemoryTransaction};
pub use notifier::TracingNotifier;
