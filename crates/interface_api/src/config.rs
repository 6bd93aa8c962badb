//! API configuration

use serde::Deserialize;
use std::time::Duration;

use core_kernel::RetryPolicy;
use domain_installment::{ReconciliationPolicy, DEFAULT_BILLING_DAY};
use infra_db::DatabaseConfig;

/// API configuration
///
/// Read from `API_`-prefixed environment variables; anything unset keeps its
/// default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Database URL
    pub database_url: String,
    /// Pool size bounds
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    /// Seconds to wait for a pooled connection
    pub db_connect_timeout_secs: u64,
    /// Log level
    pub log_level: String,
    /// `pretty` or `json`
    pub log_format: String,
    /// Upper bound for one cash entry
    pub max_cash_payment: i64,
    /// Window of the keyless cash duplicate guard
    pub duplicate_window_secs: i64,
    /// Billing day assigned when a schedule anchor is fixed
    pub default_billing_day: u32,
    /// CRM echo attempts
    pub echo_max_attempts: u32,
    /// CRM echo backoff base
    pub echo_retry_delay_ms: u64,
    /// CRM field-metadata cache TTL
    pub field_cache_ttl_secs: i64,
    /// Require a valid gateway signature on webhooks
    pub verify_webhook_signature: bool,
    /// HMAC key the gateway signs webhooks with
    pub webhook_secret: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            database_url: "postgres://localhost/installments".to_string(),
            db_max_connections: 10,
            db_min_connections: 2,
            db_connect_timeout_secs: 30,
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            max_cash_payment: 10_000_000,
            duplicate_window_secs: 30,
            default_billing_day: DEFAULT_BILLING_DAY,
            echo_max_attempts: 3,
            echo_retry_delay_ms: 1000,
            field_cache_ttl_secs: 600,
            verify_webhook_signature: false,
            webhook_secret: String::new(),
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(config::Environment::with_prefix("API").try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the server cannot run with
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.verify_webhook_signature && self.webhook_secret.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "API_WEBHOOK_SECRET is required when webhook signatures are verified".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pool settings for the ledger database
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_url.clone())
            .max_connections(self.db_max_connections.max(1))
            .min_connections(self.db_min_connections.min(self.db_max_connections))
            .connect_timeout(Duration::from_secs(self.db_connect_timeout_secs))
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Engine tunables derived from this configuration
    pub fn to_policy(&self) -> ReconciliationPolicy {
        ReconciliationPolicy {
            max_cash_payment: self.max_cash_payment,
            duplicate_window_secs: self.duplicate_window_secs,
            default_billing_day: self.default_billing_day.clamp(1, 31),
            echo_retry: RetryPolicy::new(self.echo_max_attempts, self.echo_retry_delay_ms),
            ..ReconciliationPolicy::default()
        }
    }

    pub fn field_cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.field_cache_ttl_secs.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_policy_defaults() {
        let config = ApiConfig::default();
        assert_eq!(config.to_policy(), ReconciliationPolicy::default());
        assert_eq!(config.server_addr(), "0.0.0.0:8080");
        assert!(!config.json_logs());
    }

    #[test]
    fn test_policy_carries_overrides() {
        let config = ApiConfig {
            max_cash_payment: 500,
            duplicate_window_secs: 5,
            default_billing_day: 40,
            echo_max_attempts: 0,
            echo_retry_delay_ms: 10,
            ..ApiConfig::default()
        };
        let policy = config.to_policy();
        assert_eq!(policy.max_cash_payment, 500);
        assert_eq!(policy.duplicate_window_secs, 5);
        assert_eq!(policy.default_billing_day, 31);
        assert_eq!(policy.echo_retry.max_attempts, 1);
        assert_eq!(policy.echo_retry.base_delay_ms, 10);
    }

    #[test]
    fn test_field_cache_ttl_never_negative() {
        let config = ApiConfig {
            field_cache_ttl_secs: -5,
            ..ApiConfig::default()
        };
        assert_eq!(config.field_cache_ttl(), chrono::Duration::zero());
    }

    #[test]
    fn test_signature_check_needs_secret() {
        let mut config = ApiConfig {
            verify_webhook_signature: true,
            ..ApiConfig::default()
        };
        assert!(config.validate().is_err());
        config.webhook_secret = "shop-secret".to_string();
        assert!(config.validate().is_ok());
        assert!(ApiConfig::default().validate().is_ok());
    }

    #[test]
    fn test_database_config_from_pool_settings() {
        let config = ApiConfig {
            database_url: "postgres://db/ledger".to_string(),
            db_max_connections: 4,
            db_min_connections: 8,
            db_connect_timeout_secs: 5,
            ..ApiConfig::default()
        };
        let db = config.database_config();
        assert_eq!(db.url, "postgres://db/ledger");
        assert_eq!(db.max_connections, 4);
        assert_eq!(db.min_connections, 4);
        assert_eq!(db.connect_timeout, Duration::from_secs(5));
    }
}
