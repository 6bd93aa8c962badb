//! CRM field metadata and its cache
//!
//! Enumeration fields in the CRM hold option ids; their labels come from a
//! separate, slow metadata call. `FieldMetadataCache` keeps one
//! `{value, fetched_at}` entry per field, refreshes it after the TTL, and
//! serves the stale entry when a refresh fails.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use core_kernel::SharedClock;

use crate::ports::CrmPort;

/// Default time-to-live for cached metadata
pub const DEFAULT_METADATA_TTL_SECS: i64 = 600;

/// Labels of one enumeration field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    /// Field code in the CRM
    pub field: String,
    /// Option id to human readable label
    pub items: HashMap<String, String>,
}

impl FieldMetadata {
    /// Creates metadata from `(id, label)` pairs
    pub fn new<I, K, V>(field: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            field: field.into(),
            items: items.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Returns the label for an option id
    pub fn label(&self, id: &str) -> Option<&str> {
        self.items.get(id).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
struct CachedEntry {
    value: FieldMetadata,
    fetched_at: DateTime<Utc>,
}

/// TTL cache over `CrmPort::fetch_field_metadata`
pub struct FieldMetadataCache {
    port: Arc<dyn CrmPort>,
    clock: SharedClock,
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedEntry>>,
}

impl FieldMetadataCache {
    /// Creates a cache with the given TTL
    pub fn new(port: Arc<dyn CrmPort>, clock: SharedClock, ttl: Duration) -> Self {
        Self {
            port,
            clock,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns metadata for `field`, refreshing it when older than the TTL
    ///
    /// A failed refresh falls back to the stale entry; with nothing cached the
    /// result is empty metadata. Errors are logged, never returned.
    pub async fn get(&self, field: &str) -> FieldMetadata {
        let now = self.clock.now();
        let cached = self.entries.read().await.get(field).cloned();

        if let Some(entry) = &cached {
            if now - entry.fetched_at < self.ttl {
                return entry.value.clone();
            }
        }

        match self.port.fetch_field_metadata(field).await {
            Ok(value) => {
                debug!(field, options = value.items.len(), "Refreshed CRM field metadata");
                self.entries.write().await.insert(
                    field.to_string(),
                    CachedEntry {
                        value: value.clone(),
                        fetched_at: now,
                    },
                );
                value
            }
            Err(e) => match cached {
                Some(entry) => {
                    warn!(field, error = %e, "CRM field metadata refresh failed, serving stale entry");
                    entry.value
                }
                None => {
                    warn!(field, error = %e, "CRM field metadata unavailable");
                    FieldMetadata {
                        field: field.to_string(),
                        items: HashMap::new(),
                    }
                }
            },
        }
    }

    /// Resolves raw enumeration ids to labels joined by a space
    ///
    /// `raw` may be a single id, a list of ids, or empty/`false`. Ids without a
    /// known label are passed through unchanged.
    pub async fn resolve_enum(&self, field: &str, raw: &Value) -> String {
        let ids = enum_ids(raw);
        if ids.is_empty() {
            return String::new();
        }

        let metadata = self.get(field).await;
        ids.iter()
            .map(|id| metadata.label(id).unwrap_or(id.as_str()).to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Drops the cached entry for `field`
    pub async fn invalidate(&self, field: &str) {
        self.entries.write().await.remove(field);
    }
}

fn enum_ids(raw: &Value) -> Vec<String> {
    let scalar = |v: &Value| match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    match raw {
        Value::Array(items) => items.iter().filter_map(scalar).collect(),
        other => scalar(other).into_iter().collect(),
    }
}
