//! Database configuration.

use serde::Deserialize;

/// Relational store connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `sqlite://./predictions.db`.
    pub url: String,
    /// Upper bound of pooled connections.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./predictions.db".to_string(),
            max_connections: 5,
        }
    }
}
