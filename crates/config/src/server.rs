//! HTTP server configuration settings.

use std::net::SocketAddr;

use serde::Deserialize;

use crate::{HealthConfig, RateLimitConfig, TlsServerConfig};

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// TLS configuration for secure connections.
    pub tls: Option<TlsServerConfig>,
    /// Health endpoint configuration.
    #[serde(default)]
    pub health: HealthConfig,
    /// Admission control configuration
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
}
