//! Circuit breaker around a CRM adapter
//!
//! The paid-amount echo retries each push a few times. When the CRM is down
//! for a long stretch, every committed payment would still spend its full
//! retry budget against a dead endpoint. `GuardedCrmAdapter` counts
//! consecutive transient failures and, past a threshold, fails calls
//! immediately with `PortError::ServiceUnavailable` until the reset timeout
//! elapses; then a trial call is let through (half-open).
//!
//! Non-transient errors (not found, validation) do not trip the breaker.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

use core_kernel::{
    AdapterHealth, DealId, DomainPort, HealthCheckResult, HealthCheckable, PortError,
};

use crate::deal::RawCrmDeal;
use crate::metadata::FieldMetadata;
use crate::ports::CrmPort;

/// Circuit breaker thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive transient failures before opening the circuit
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before half-opening
    pub reset_timeout_secs: u64,
    /// Consecutive successes needed to close the circuit from half-open
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 60,
            success_threshold: 1,
        }
    }
}

#[derive(Debug)]
struct CircuitBreaker {
    config: CircuitBreakerConfig,
    failure_count: AtomicU64,
    success_count: AtomicU64,
    is_open: AtomicBool,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            failure_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            is_open: AtomicBool::new(false),
            opened_at: RwLock::new(None),
        }
    }

    async fn is_available(&self) -> bool {
        if !self.is_open.load(Ordering::SeqCst) {
            return true;
        }

        match *self.opened_at.read().await {
            Some(at) => at.elapsed() >= Duration::from_secs(self.config.reset_timeout_secs),
            None => true,
        }
    }

    fn record_success(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        if !self.is_open.load(Ordering::SeqCst) {
            return;
        }
        let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
        if successes >= u64::from(self.config.success_threshold) {
            self.is_open.store(false, Ordering::SeqCst);
            self.success_count.store(0, Ordering::SeqCst);
        }
    }

    async fn record_failure(&self) {
        self.success_count.store(0, Ordering::SeqCst);
        let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= u64::from(self.config.failure_threshold) {
            if !self.is_open.swap(true, Ordering::SeqCst) {
                warn!(failures, "CRM circuit breaker opened");
            }
            *self.opened_at.write().await = Some(Instant::now());
        }
    }

    fn is_open(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }
}

/// Wraps any `CrmPort` with a circuit breaker
#[derive(Debug)]
pub struct GuardedCrmAdapter<P> {
    inner: P,
    breaker: CircuitBreaker,
}

impl<P: CrmPort> GuardedCrmAdapter<P> {
    /// Wraps `inner` with the given thresholds
    pub fn new(inner: P, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(config),
        }
    }

    /// Returns the wrapped adapter
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Returns true while calls are being short-circuited
    pub fn is_open(&self) -> bool {
        self.breaker.is_open()
    }

    async fn guard<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, PortError>> + Send,
    ) -> Result<T, PortError> {
        if !self.breaker.is_available().await {
            return Err(PortError::ServiceUnavailable {
                service: "CRM (circuit open)".to_string(),
            });
        }

        let result = call.await;
        match &result {
            Err(e) if e.is_transient() => self.breaker.record_failure().await,
            _ => self.breaker.record_success(),
        }
        result
    }
}

impl<P: CrmPort> DomainPort for GuardedCrmAdapter<P> {}

#[async_trait]
impl<P: CrmPort> HealthCheckable for GuardedCrmAdapter<P> {
    async fn health_check(&self) -> HealthCheckResult {
        if self.breaker.is_open() {
            return HealthCheckResult {
                adapter_id: "guarded-crm".to_string(),
                status: AdapterHealth::Degraded,
                latency_ms: 0,
                message: Some("circuit open".to_string()),
                checked_at: Utc::now(),
            };
        }
        self.inner.health_check().await
    }
}

#[async_trait]
impl<P: CrmPort> CrmPort for GuardedCrmAdapter<P> {
    async fn fetch_deal(&self, deal_id: &DealId) -> Result<Option<RawCrmDeal>, PortError> {
        self.guard(self.inner.fetch_deal(deal_id)).await
    }

    async fn push_paid_amount(&self, deal_id: &DealId, paid_amount: i64) -> Result<(), PortError> {
        self.guard(self.inner.push_paid_amount(deal_id, paid_amount)).await
    }

    async fn fetch_field_metadata(&self, field: &str) -> Result<FieldMetadata, PortError> {
        self.guard(self.inner.fetch_field_metadata(field)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mock::MockCrmPort;

    fn config(reset_timeout_secs: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout_secs,
            success_threshold: 1,
        }
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let mock = MockCrmPort::new();
        mock.fail_next_pushes(2);
        let adapter = GuardedCrmAdapter::new(mock, config(3600));
        let deal = DealId::new("1").unwrap();

        assert!(adapter.push_paid_amount(&deal, 10).await.is_err());
        assert!(!adapter.is_open());
        assert!(adapter.push_paid_amount(&deal, 10).await.is_err());
        assert!(adapter.is_open());

        let short_circuited = adapter.push_paid_amount(&deal, 10).await.unwrap_err();
        assert!(matches!(short_circuited, PortError::ServiceUnavailable { .. }));
        assert!(adapter.inner().pushes().await.is_empty());
    }

    #[tokio::test]
    async fn test_half_open_trial_closes_circuit() {
        let mock = MockCrmPort::new();
        mock.fail_next_pushes(2);
        let adapter = GuardedCrmAdapter::new(mock, config(0));
        let deal = DealId::new("1").unwrap();

        let _ = adapter.push_paid_amount(&deal, 10).await;
        let _ = adapter.push_paid_amount(&deal, 10).await;
        assert!(adapter.is_open());

        adapter.push_paid_amount(&deal, 20).await.unwrap();
        assert!(!adapter.is_open());
        assert_eq!(adapter.health_check().await.status, AdapterHealth::Healthy);
    }

    #[tokio::test]
    async fn test_not_found_does_not_trip() {
        let adapter = GuardedCrmAdapter::new(MockCrmPort::new(), config(3600));
        for _ in 0..5 {
            let _ = adapter.fetch_field_metadata("UF_MISSING").await;
        }
        assert!(!adapter.is_open());
    }
}
