//! CRM Domain - the external system of record for deals
//!
//! Deals originate in a CRM whose records are loosely typed. This crate
//! isolates that collaborator behind `CrmPort` so the reconciliation core only
//! ever sees typed `CrmDealSnapshot` values.
//!
//! # Components
//!
//! - **Deal normalization**: `RawCrmDeal` to `CrmDealSnapshot` through the
//!   kernel's lenient amount and date parsing
//! - **Field metadata cache**: TTL cache with stale fallback for enumeration
//!   labels, driven by an injected clock
//! - **Adapters**: circuit breaker decorator and a detached stand-in
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_crm::{CrmPortExt, FieldMetadataCache};
//!
//! let snapshot = crm.require_snapshot(&deal_id).await?;
//! let project = cache.resolve_enum("UF_PROJECT_TYPE", &raw_value).await;
//! ```

pub mod deal;
pub mod metadata;
pub mod ports;
pub mod adapters;

pub use deal::{CrmDealSnapshot, RawCrmDeal, MAX_TERM_MONTHS};
pub use metadata::{FieldMetadata, FieldMetadataCache, DEFAULT_METADATA_TTL_SECS};
pub use ports::{CrmPort, CrmPortExt};
#[cfg(any(test, feature = "mock"))]
pub use ports::mock::MockCrmPort;
pub use adapters::{CircuitBreakerConfig, DetachedCrmAdapter, GuardedCrmAdapter};
