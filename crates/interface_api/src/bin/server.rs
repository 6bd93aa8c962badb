//! Installment reconciliation - API Server Binary
//!
//! This binary starts the HTTP API server for gateway webhooks, cash entry,
//! and contract administration.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin installment-api
//!
//! # Run with environment variables
//! API_PORT=8080 API_DATABASE_URL=postgres://... cargo run --bin installment-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` / `API_PORT` - bind address (default: 0.0.0.0:8080)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_DB_MAX_CONNECTIONS` / `API_DB_MIN_CONNECTIONS` / `API_DB_CONNECT_TIMEOUT_SECS` - pool sizing (default: 10 / 2 / 30)
//! * `API_LOG_LEVEL` - trace, debug, info, warn, error (default: info; `RUST_LOG` wins)
//! * `API_LOG_FORMAT` - `pretty` or `json` (default: pretty)
//! * `API_MAX_CASH_PAYMENT` - upper bound for one cash entry (default: 10000000)
//! * `API_DUPLICATE_WINDOW_SECS` - keyless cash duplicate guard (default: 30)
//! * `API_DEFAULT_BILLING_DAY` - billing day for new contracts (default: 10)
//! * `API_ECHO_MAX_ATTEMPTS` / `API_ECHO_RETRY_DELAY_MS` - CRM echo retries (default: 3 / 1000)
//! * `API_FIELD_CACHE_TTL_SECS` - CRM field metadata TTL (default: 600)
//! * `API_VERIFY_WEBHOOK_SIGNATURE` / `API_WEBHOOK_SECRET` - HMAC check of gateway webhooks (default: off)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::{SharedClock, SystemClock};
use domain_crm::{CircuitBreakerConfig, CrmPort, DetachedCrmAdapter, GuardedCrmAdapter};
use domain_installment::{ContractStore, NotificationPort, TracingNotifier};
use infra_db::{create_pool, run_migrations, PostgresContractStore};
use interface_api::{config::ApiConfig, create_router, AppState};

/// Main entry point for the API server.
///
/// Initializes logging, loads configuration, establishes the database
/// connection, applies migrations, and starts the HTTP server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("invalid API_* configuration")?;

    init_tracing(&config);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Starting installment API server"
    );

    let pool = create_pool(config.database_config())
        .await
        .context("database connection failed")?;
    run_migrations(&pool).await.context("database migration failed")?;

    let store: Arc<dyn ContractStore> = Arc::new(PostgresContractStore::new(pool));
    let crm: Arc<dyn CrmPort> = Arc::new(GuardedCrmAdapter::new(
        DetachedCrmAdapter,
        CircuitBreakerConfig::default(),
    ));
    let notifier: Arc<dyn NotificationPort> = Arc::new(TracingNotifier);
    let clock: SharedClock = Arc::new(SystemClock);

    let state = AppState::new(store, crm, notifier, clock, config.clone());
    let app = create_router(state);

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server_addr()))?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(config: &ApiConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
