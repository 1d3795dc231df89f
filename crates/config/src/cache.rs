//! Prediction cache configuration.

use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Time-boxed in-memory cache of prediction payloads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Whether lookups consult the cache at all.
    pub enabled: bool,
    /// Lifetime of an entry counted from insertion.
    #[serde(deserialize_with = "deserialize_duration")]
    pub ttl: Duration,
    /// Upper bound on cached predictions.
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(24 * 60 * 60),
            max_capacity: 10_000,
        }
    }
}
