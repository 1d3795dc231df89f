//! Liveness endpoint settings.
//!
//! The endpoint reports whether the prediction store still answers. It is
//! never subject to admission, and can be moved to its own listener so that
//! orchestrators reach it on a private port.

use std::{borrow::Cow, net::SocketAddr};

use serde::Deserialize;

/// API paths the health route must not shadow.
const API_PREFIXES: &[&str] = &["/predict", "/prediction", "/image", "/labels", "/stats"];

/// Liveness endpoint settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Set to false to serve no health route at all.
    pub enabled: bool,
    /// A separate address for the health route. When unset it is mounted on the API listener.
    pub listen: Option<SocketAddr>,
    pub path: Cow<'static, str>,
}

impl HealthConfig {
    /// Address of the dedicated health listener, if one should be started.
    pub fn dedicated_listener(&self) -> Option<SocketAddr> {
        self.listen.filter(|_| self.enabled)
    }

    /// Path to mount next to the API routes, if the health route shares their listener.
    pub fn shared_path(&self) -> Option<&str> {
        (self.enabled && self.listen.is_none()).then_some(self.path.as_ref())
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if !self.path.starts_with('/') {
            anyhow::bail!("server.health.path '{}' must start with '/'", self.path);
        }

        if self.listen.is_none() {
            let shadowed = API_PREFIXES
                .iter()
                .find(|prefix| self.path == **prefix || self.path.starts_with(&format!("{prefix}/")));

            if let Some(prefix) = shadowed {
                anyhow::bail!("server.health.path '{}' collides with the {prefix} API route", self.path);
            }
        }

        Ok(())
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            enabled: true,
            listen: None,
            path: Cow::Borrowed("/health"),
        }
    }
}
