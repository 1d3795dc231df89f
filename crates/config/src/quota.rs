//! Persisted-history quotas.

use serde::Deserialize;

/// Caps on stored prediction sessions per authenticated user.
///
/// Both windows are evaluated against UTC: the monthly window starts at the
/// first instant of the current calendar month, the daily window is the
/// trailing 24 hours.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuotaConfig {
    /// Maximum sessions since the start of the current month.
    pub monthly_limit: Option<u32>,
    /// Maximum sessions in the trailing 24 hours.
    pub daily_limit: Option<u32>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            monthly_limit: Some(100),
            daily_limit: None,
        }
    }
}
