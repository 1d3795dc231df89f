//! Admission control configuration.
//!
//! The burst window is one second and the upload window is sixty seconds; only
//! the number of events allowed inside each window is configurable.

use serde::Deserialize;

/// Sliding-window admission limits applied to every API request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Whether admission control is enabled.
    pub enabled: bool,
    /// Requests allowed per rate key inside the one-second burst window.
    pub requests_per_second: u32,
    /// Uploads allowed per rate key inside the sixty-second upload window.
    pub uploads_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 30,
            uploads_per_minute: 10,
        }
    }
}
