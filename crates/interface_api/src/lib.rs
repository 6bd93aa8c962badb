//! HTTP API Layer
//!
//! This crate provides the REST API for installment reconciliation using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: gateway webhook, operator deal endpoints, CRM metadata, health
//! - **Middleware**: tracing and audit logging
//! - **DTOs**: Request bodies with field validation
//! - **Error Handling**: Consistent error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::new(store, crm, notifier, clock, config);
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod signature;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware as axum_middleware,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tower_http::cors::{CorsLayer, Any};

use core_kernel::SharedClock;
use domain_crm::{CrmPort, FieldMetadataCache};
use domain_installment::{ContractStore, NotificationPort, ReconciliationService};

use crate::config::ApiConfig;
use crate::middleware::audit_middleware;
use crate::handlers::{crm, deals, health, webhooks};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ReconciliationService>,
    pub field_cache: Arc<FieldMetadataCache>,
    pub config: ApiConfig,
}

impl AppState {
    /// Wires the engine and the metadata cache from their collaborators
    pub fn new(
        store: Arc<dyn ContractStore>,
        crm: Arc<dyn CrmPort>,
        notifier: Arc<dyn NotificationPort>,
        clock: SharedClock,
        config: ApiConfig,
    ) -> Self {
        let field_cache = FieldMetadataCache::new(crm.clone(), clock.clone(), config.field_cache_ttl());
        let service = ReconciliationService::new(store, crm, notifier, clock, config.to_policy());
        Self {
            service: Arc::new(service),
            field_cache: Arc::new(field_cache),
            config,
        }
    }
}

/// Creates the main API router
///
/// # Arguments
///
/// * `state` - Engine, metadata cache, and configuration
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let deal_routes = Router::new()
        .route("/", get(deals::list_deals))
        .route("/:deal_id", get(deals::get_deal))
        .route("/:deal_id/schedule", get(deals::get_schedule))
        .route(
            "/:deal_id/payments",
            get(deals::list_payments).post(deals::create_payment),
        )
        .route("/:deal_id/cash-payments", post(deals::record_cash_payment))
        .route("/:deal_id/settings", put(deals::update_settings))
        .route("/:deal_id/sync", post(deals::sync_deal));

    let api_routes = Router::new()
        .route("/webhooks/gateway", post(webhooks::gateway_webhook))
        .route("/crm/fields/:field", get(crm::field_metadata))
        .nest("/deals", deal_routes)
        .layer(axum_middleware::from_fn_with_state(state.clone(), audit_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}
