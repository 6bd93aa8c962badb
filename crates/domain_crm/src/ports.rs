//! CRM Domain Ports
//!
//! This module defines the port through which the installment engine talks
//! to the CRM: deal lookups when a deal is first seen, the best-effort echo
//! of the aggregate paid amount after a commit, and enumeration metadata.
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_crm::{CrmPort, CrmPortExt};
//! use std::sync::Arc;
//!
//! let crm: Arc<dyn CrmPort> = Arc::new(MockCrmPort::new());
//! if let Some(snapshot) = crm.fetch_snapshot(&deal_id).await? {
//!     println!("{} owes {}", snapshot.title, snapshot.total_amount);
//! }
//! ```

use async_trait::async_trait;

use core_kernel::{DealId, DomainPort, HealthCheckable, PortError};

use crate::deal::{CrmDealSnapshot, RawCrmDeal};
use crate::metadata::FieldMetadata;

/// Port to the CRM system of record for deals
#[async_trait]
pub trait CrmPort: DomainPort + HealthCheckable {
    /// Looks up a deal
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the CRM does not know the deal
    async fn fetch_deal(&self, deal_id: &DealId) -> Result<Option<RawCrmDeal>, PortError>;

    /// Writes the aggregate paid amount back to the deal
    async fn push_paid_amount(&self, deal_id: &DealId, paid_amount: i64) -> Result<(), PortError>;

    /// Fetches option labels for an enumeration field
    async fn fetch_field_metadata(&self, field: &str) -> Result<FieldMetadata, PortError>;
}

/// Extension trait for CrmPort with convenience methods
#[async_trait]
pub trait CrmPortExt: CrmPort {
    /// Looks up a deal and normalizes it
    async fn fetch_snapshot(&self, deal_id: &DealId) -> Result<Option<CrmDealSnapshot>, PortError> {
        match self.fetch_deal(deal_id).await? {
            Some(raw) => raw.normalize(deal_id).map(Some),
            None => Ok(None),
        }
    }

    /// Looks up a deal, treating absence as `PortError::NotFound`
    async fn require_snapshot(&self, deal_id: &DealId) -> Result<CrmDealSnapshot, PortError> {
        self.fetch_snapshot(deal_id)
            .await?
            .ok_or_else(|| PortError::not_found("Deal", deal_id))
    }
}

// Blanket implementation for all CrmPort implementors
impl<T: CrmPort + ?Sized> CrmPortExt for T {}

/// Mock implementation of CrmPort for testing
///
/// Deals and metadata live in memory. Failures can be injected to exercise
/// retry and fallback paths.
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use core_kernel::HealthCheckResult;

    /// In-memory mock implementation of CrmPort
    #[derive(Debug, Default)]
    pub struct MockCrmPort {
        deals: Arc<RwLock<HashMap<DealId, RawCrmDeal>>>,
        metadata: Arc<RwLock<HashMap<String, FieldMetadata>>>,
        pushes: Arc<RwLock<Vec<(DealId, i64)>>>,
        failing_pushes: AtomicU32,
        failing_lookups: AtomicU32,
        metadata_calls: AtomicU32,
    }

    impl MockCrmPort {
        /// Creates a new mock port
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers a deal
        pub async fn insert_deal(&self, deal_id: &DealId, deal: RawCrmDeal) {
            self.deals.write().await.insert(deal_id.clone(), deal);
        }

        /// Registers enumeration metadata
        pub async fn insert_metadata(&self, metadata: FieldMetadata) {
            self.metadata.write().await.insert(metadata.field.clone(), metadata);
        }

        /// Makes the next `count` pushes fail with a connection error
        pub fn fail_next_pushes(&self, count: u32) {
            self.failing_pushes.store(count, Ordering::SeqCst);
        }

        /// Makes the next `count` deal or metadata lookups fail
        pub fn fail_next_lookups(&self, count: u32) {
            self.failing_lookups.store(count, Ordering::SeqCst);
        }

        /// Paid amounts successfully pushed, in order
        pub async fn pushes(&self) -> Vec<(DealId, i64)> {
            self.pushes.read().await.clone()
        }

        /// Number of metadata fetches that reached the mock
        pub fn metadata_calls(&self) -> u32 {
            self.metadata_calls.load(Ordering::SeqCst)
        }

        fn take_failure(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    impl DomainPort for MockCrmPort {}

    #[async_trait]
    impl HealthCheckable for MockCrmPort {
        async fn health_check(&self) -> HealthCheckResult {
            HealthCheckResult::healthy("mock-crm-port")
        }
    }

    #[async_trait]
    impl CrmPort for MockCrmPort {
        async fn fetch_deal(&self, deal_id: &DealId) -> Result<Option<RawCrmDeal>, PortError> {
            if Self::take_failure(&self.failing_lookups) {
                return Err(PortError::connection("mock CRM lookup failure"));
            }
            Ok(self.deals.read().await.get(deal_id).cloned())
        }

        async fn push_paid_amount(&self, deal_id: &DealId, paid_amount: i64) -> Result<(), PortError> {
            if Self::take_failure(&self.failing_pushes) {
                return Err(PortError::connection("mock CRM push failure"));
            }
            self.pushes.write().await.push((deal_id.clone(), paid_amount));
            Ok(())
        }

        async fn fetch_field_metadata(&self, field: &str) -> Result<FieldMetadata, PortError> {
            self.metadata_calls.fetch_add(1, Ordering::SeqCst);
            if Self::take_failure(&self.failing_lookups) {
                return Err(PortError::ServiceUnavailable {
                    service: "mock CRM metadata".to_string(),
                });
            }
            self.metadata
                .read()
                .await
                .get(field)
                .cloned()
                .ok_or_else(|| PortError::not_found("Field", field))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockCrmPort;
    use super::*;
    use serde_json::json;

    fn deal_id() -> DealId {
        DealId::new("9001").unwrap()
    }

    #[tokio::test]
    async fn test_mock_port_snapshot() {
        let port = MockCrmPort::new();
        port.insert_deal(
            &deal_id(),
            RawCrmDeal {
                id: json!("9001"),
                opportunity: json!("300 000,00"),
                term_months: json!("6"),
                ..Default::default()
            },
        )
        .await;

        let snapshot = port.fetch_snapshot(&deal_id()).await.unwrap().unwrap();
        assert_eq!(snapshot.total_amount, 300000);
        assert_eq!(snapshot.term_months, 6);
    }

    #[tokio::test]
    async fn test_mock_port_not_found() {
        let port = MockCrmPort::new();
        let result = port.require_snapshot(&deal_id()).await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_mock_port_injected_push_failure() {
        let port = MockCrmPort::new();
        port.fail_next_pushes(1);

        assert!(port.push_paid_amount(&deal_id(), 100).await.is_err());
        assert!(port.push_paid_amount(&deal_id(), 200).await.is_ok());
        assert_eq!(port.pushes().await, vec![(deal_id(), 200)]);
    }

    #[tokio::test]
    async fn test_mock_port_health_check() {
        let port = MockCrmPort::new();
        let result = port.health_check().await;
        assert_eq!(result.status, core_kernel::AdapterHealth::Healthy);
    }
}
