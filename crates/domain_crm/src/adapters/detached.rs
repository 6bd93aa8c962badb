//! CRM adapter for deployments without a CRM connection
//!
//! Every lookup answers "unknown deal" and every push is dropped after a
//! debug log. Deals then only enter the system through gateway payments, and
//! the paid-amount echo becomes a no-op.

use async_trait::async_trait;
use tracing::debug;

use core_kernel::{DealId, DomainPort, HealthCheckResult, HealthCheckable, PortError};

use crate::deal::RawCrmDeal;
use crate::metadata::FieldMetadata;
use crate::ports::CrmPort;

/// A `CrmPort` that is not connected to anything
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedCrmAdapter;

impl DomainPort for DetachedCrmAdapter {}

#[async_trait]
impl HealthCheckable for DetachedCrmAdapter {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult {
            message: Some("no CRM configured".to_string()),
            ..HealthCheckResult::healthy("detached-crm")
        }
    }
}

#[async_trait]
impl CrmPort for DetachedCrmAdapter {
    async fn fetch_deal(&self, deal_id: &DealId) -> Result<Option<RawCrmDeal>, PortError> {
        debug!(deal_id = %deal_id, "CRM detached, deal lookup skipped");
        Ok(None)
    }

    async fn push_paid_amount(&self, deal_id: &DealId, paid_amount: i64) -> Result<(), PortError> {
        debug!(deal_id = %deal_id, paid_amount, "CRM detached, paid amount not pushed");
        Ok(())
    }

    async fn fetch_field_metadata(&self, field: &str) -> Result<FieldMetadata, PortError> {
        Ok(FieldMetadata::new(field, Vec::<(String, String)>::new()))
    }
}
