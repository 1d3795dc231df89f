//! Lookout configuration structures to map the lookout.toml configuration.

#![deny(missing_docs)]

mod cache;
mod database;
mod detector;
mod health;
mod loader;
mod quota;
mod rate_limit;
mod retention;
mod server;
mod tls;
mod uploads;

use std::path::Path;

pub use cache::CacheConfig;
pub use database::DatabaseConfig;
pub use detector::DetectorConfig;
pub use health::HealthConfig;
pub use quota::QuotaConfig;
pub use rate_limit::RateLimitConfig;
pub use retention::RetentionConfig;
use serde::Deserialize;
pub use server::ServerConfig;
pub use tls::TlsServerConfig;
pub use uploads::UploadsConfig;

/// Main configuration structure for the Lookout service.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Persisted-history quotas for authenticated uploads.
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Retention sweep of aged upload files.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// In-memory prediction cache.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Relational persistence settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Detection backend settings.
    #[serde(default)]
    pub detector: DetectorConfig,
    /// Upload handling settings.
    #[serde(default)]
    pub uploads: UploadsConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates limits that must be non-zero for the service to make progress.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}
