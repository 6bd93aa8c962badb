//! Tests for CRM deal normalization and the field metadata cache

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use core_kernel::{
    DealId, DomainPort, FixedClock, HealthCheckResult, HealthCheckable, PortError, SharedClock,
};
use domain_crm::{CrmPort, CrmPortExt, FieldMetadata, FieldMetadataCache, RawCrmDeal};

fn deal_id(raw: &str) -> DealId {
    DealId::new(raw).unwrap()
}

/// Scripted CRM: each metadata call pops the next scripted answer
struct ScriptedCrm {
    deal: Option<RawCrmDeal>,
    metadata_answers: Mutex<VecDeque<Result<FieldMetadata, PortError>>>,
    metadata_calls: AtomicU32,
}

impl ScriptedCrm {
    fn with_metadata(answers: Vec<Result<FieldMetadata, PortError>>) -> Self {
        Self {
            deal: None,
            metadata_answers: Mutex::new(answers.into()),
            metadata_calls: AtomicU32::new(0),
        }
    }

    fn with_deal(deal: RawCrmDeal) -> Self {
        Self {
            deal: Some(deal),
            metadata_answers: Mutex::new(VecDeque::new()),
            metadata_calls: AtomicU32::new(0),
        }
    }
}

impl DomainPort for ScriptedCrm {}

#[async_trait]
impl HealthCheckable for ScriptedCrm {
    async fn health_check(&self) -> HealthCheckResult {
        HealthCheckResult::healthy("scripted-crm")
    }
}

#[async_trait]
impl CrmPort for ScriptedCrm {
    async fn fetch_deal(&self, _deal_id: &DealId) -> Result<Option<RawCrmDeal>, PortError> {
        Ok(self.deal.clone())
    }

    async fn push_paid_amount(&self, _deal_id: &DealId, _paid: i64) -> Result<(), PortError> {
        Ok(())
    }

    async fn fetch_field_metadata(&self, field: &str) -> Result<FieldMetadata, PortError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.metadata_answers
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(PortError::not_found("Field", field)))
    }
}

fn project_types() -> FieldMetadata {
    FieldMetadata::new("UF_PROJECT_TYPE", [("44", "Kitchen"), ("45", "Bathroom")])
}

fn clock_at_noon() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()))
}

// ============================================================================
// Deal normalization
// ============================================================================

mod normalization_tests {
    use super::*;

    #[test]
    fn test_full_record() {
        let raw = RawCrmDeal {
            id: json!("318"),
            title: json!("  Kitchen renovation "),
            opportunity: json!("300 000,00"),
            term_months: json!("6"),
            down_payment: json!(0),
            paid_amount: json!("40000"),
            begin_date: json!("2024-03-15T00:00:00+03:00"),
            date_created: json!("2024-03-01T09:00:00+03:00"),
            contact_email: json!([{"VALUE": "buyer@example.com"}]),
        };

        let snapshot = raw.normalize(&deal_id("318")).unwrap();
        assert_eq!(snapshot.deal_id, deal_id("318"));
        assert_eq!(snapshot.title, "Kitchen renovation");
        assert_eq!(snapshot.total_amount, 300000);
        assert_eq!(snapshot.term_months, 6);
        assert_eq!(snapshot.down_payment, 0);
        assert_eq!(snapshot.paid_amount, 40000);
        assert_eq!(snapshot.start_date, NaiveDate::from_ymd_opt(2024, 3, 15));
        assert_eq!(snapshot.contact_email.as_deref(), Some("buyer@example.com"));
    }

    #[test]
    fn test_missing_id_uses_requested() {
        let snapshot = RawCrmDeal::default().normalize(&deal_id("77")).unwrap();
        assert_eq!(snapshot.deal_id, deal_id("77"));
        assert_eq!(snapshot.total_amount, 0);
        assert_eq!(snapshot.term_months, 0);
        assert_eq!(snapshot.start_date, None);
        assert_eq!(snapshot.contact_email, None);
    }

    #[test]
    fn test_start_date_falls_back_to_creation() {
        let raw = RawCrmDeal {
            begin_date: json!(""),
            date_created: json!("2024-01-20T10:00:00Z"),
            ..Default::default()
        };
        let snapshot = raw.normalize(&deal_id("1")).unwrap();
        assert_eq!(snapshot.start_date, NaiveDate::from_ymd_opt(2024, 1, 20));
    }

    #[test]
    fn test_negative_values_become_zero() {
        let raw = RawCrmDeal {
            opportunity: json!(-5000),
            down_payment: json!("-1"),
            paid_amount: json!(-3),
            term_months: json!(-2),
            ..Default::default()
        };
        let snapshot = raw.normalize(&deal_id("1")).unwrap();
        assert_eq!(snapshot.total_amount, 0);
        assert_eq!(snapshot.down_payment, 0);
        assert_eq!(snapshot.paid_amount, 0);
        assert_eq!(snapshot.term_months, 0);
    }

    #[test]
    fn test_term_clamped_to_maximum() {
        let raw = RawCrmDeal {
            term_months: json!("240"),
            ..Default::default()
        };
        assert_eq!(raw.normalize(&deal_id("1")).unwrap().term_months, 120);
    }

    #[test]
    fn test_down_payment_capped_at_total() {
        let raw = RawCrmDeal {
            opportunity: json!(100000),
            down_payment: json!(150000),
            ..Default::default()
        };
        assert_eq!(raw.normalize(&deal_id("1")).unwrap().down_payment, 100000);
    }

    #[test]
    fn test_deserializes_from_partial_json() {
        let raw: RawCrmDeal =
            serde_json::from_value(json!({"id": 12, "opportunity": "1500.50"})).unwrap();
        let snapshot = raw.normalize(&deal_id("12")).unwrap();
        assert_eq!(snapshot.total_amount, 1500);
    }

    #[tokio::test]
    async fn test_port_extension_normalizes() {
        let crm = ScriptedCrm::with_deal(RawCrmDeal {
            opportunity: json!("50 000"),
            term_months: json!(12),
            down_payment: json!("50000"),
            ..Default::default()
        });
        let snapshot = crm.require_snapshot(&deal_id("5")).await.unwrap();
        assert_eq!(snapshot.total_amount, 50000);
        assert_eq!(snapshot.down_payment, 50000);
    }
}

// ============================================================================
// Field metadata cache
// ============================================================================

mod metadata_cache_tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_entry_is_served_from_cache() {
        let crm = Arc::new(ScriptedCrm::with_metadata(vec![Ok(project_types())]));
        let clock = clock_at_noon();
        let cache = FieldMetadataCache::new(crm.clone(), clock.clone() as SharedClock, Duration::minutes(10));

        cache.get("UF_PROJECT_TYPE").await;
        clock.advance(Duration::minutes(9));
        let metadata = cache.get("UF_PROJECT_TYPE").await;

        assert_eq!(metadata.label("44"), Some("Kitchen"));
        assert_eq!(crm.metadata_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refreshed() {
        let refreshed = FieldMetadata::new("UF_PROJECT_TYPE", [("44", "Kitchen v2")]);
        let crm = Arc::new(ScriptedCrm::with_metadata(vec![Ok(project_types()), Ok(refreshed)]));
        let clock = clock_at_noon();
        let cache = FieldMetadataCache::new(crm.clone(), clock.clone() as SharedClock, Duration::minutes(10));

        cache.get("UF_PROJECT_TYPE").await;
        clock.advance(Duration::minutes(10));
        let metadata = cache.get("UF_PROJECT_TYPE").await;

        assert_eq!(metadata.label("44"), Some("Kitchen v2"));
        assert_eq!(crm.metadata_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_stale_entry() {
        let crm = Arc::new(ScriptedCrm::with_metadata(vec![
            Ok(project_types()),
            Err(PortError::connection("timeout")),
        ]));
        let clock = clock_at_noon();
        let cache = FieldMetadataCache::new(crm.clone(), clock.clone() as SharedClock, Duration::minutes(10));

        cache.get("UF_PROJECT_TYPE").await;
        clock.advance(Duration::hours(1));
        let metadata = cache.get("UF_PROJECT_TYPE").await;

        assert_eq!(metadata.label("45"), Some("Bathroom"));
    }

    #[tokio::test]
    async fn test_failure_without_cache_is_empty() {
        let crm = Arc::new(ScriptedCrm::with_metadata(vec![Err(PortError::connection("down"))]));
        let cache = FieldMetadataCache::new(crm, clock_at_noon() as SharedClock, Duration::minutes(10));

        let metadata = cache.get("UF_PROJECT_TYPE").await;
        assert!(metadata.items.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_enum_maps_and_passes_through() {
        let crm = Arc::new(ScriptedCrm::with_metadata(vec![Ok(project_types())]));
        let cache = FieldMetadataCache::new(crm, clock_at_noon() as SharedClock, Duration::minutes(10));

        let resolved = cache.resolve_enum("UF_PROJECT_TYPE", &json!(["44", 99, "45"])).await;
        assert_eq!(resolved, "Kitchen 99 Bathroom");
    }

    #[tokio::test]
    async fn test_resolve_enum_empty_skips_lookup() {
        let crm = Arc::new(ScriptedCrm::with_metadata(vec![]));
        let cache = FieldMetadataCache::new(crm.clone(), clock_at_noon() as SharedClock, Duration::minutes(10));

        assert_eq!(cache.resolve_enum("UF_PROJECT_TYPE", &json!(false)).await, "");
        assert_eq!(crm.metadata_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let crm = Arc::new(ScriptedCrm::with_metadata(vec![Ok(project_types()), Ok(project_types())]));
        let cache = FieldMetadataCache::new(crm.clone(), clock_at_noon() as SharedClock, Duration::minutes(10));

        cache.get("UF_PROJECT_TYPE").await;
        cache.invalidate("UF_PROJECT_TYPE").await;
        cache.get("UF_PROJECT_TYPE").await;

        assert_eq!(crm.metadata_calls.load(Ordering::SeqCst), 2);
    }
}
