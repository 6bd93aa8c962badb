//! CRM adapters
//!
//! - `GuardedCrmAdapter`: circuit breaker decorator for any `CrmPort`
//! - `DetachedCrmAdapter`: stand-in when no CRM is configured

pub mod circuit_breaker;
pub mod detached;

pub use circuit_breaker::{CircuitBreakerConfig, GuardedCrmAdapter};
pub use detached::DetachedCrmAdapter;
