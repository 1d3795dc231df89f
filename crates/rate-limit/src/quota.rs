//! Per-user prediction quotas over persisted history.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use config::QuotaConfig;
use storage::SessionHistory;

use crate::error::QuotaError;

/// Caps how many predictions a user may create per calendar month and per
/// trailing 24 hours.
///
/// Counts come from the session history on every call, so the limits survive
/// restarts and hold across multiple server processes sharing one database.
pub struct QuotaEnforcer {
    history: Arc<dyn SessionHistory>,
    monthly_limit: Option<u32>,
    daily_limit: Option<u32>,
}

impl QuotaEnforcer {
    /// Creates an enforcer reading counts from `history`.
    pub fn new(history: Arc<dyn SessionHistory>, config: &QuotaConfig) -> Self {
        Self {
            history,
            monthly_limit: config.monthly_limit,
            daily_limit: config.daily_limit,
        }
    }

    /// Whether any limit is configured.
    pub fn is_active(&self) -> bool {
        self.monthly_limit.is_some() || self.daily_limit.is_some()
    }

    /// Rejects when `username` already reached a configured limit.
    pub async fn enforce(&self, username: &str) -> Result<(), QuotaError> {
        self.enforce_at(username, Utc::now()).await
    }

    /// Same as [`enforce`](Self::enforce) with an explicit current time.
    ///
    /// The monthly limit is checked before the daily one.
    pub async fn enforce_at(&self, username: &str, now: DateTime<Utc>) -> Result<(), QuotaError> {
        if let Some(limit) = self.monthly_limit {
            let used = self.history.count_sessions_since(username, month_start(now)).await?;

            if used >= u64::from(limit) {
                log::info!("Monthly prediction quota of {limit} reached for user '{username}'");
                return Err(QuotaError::MonthlyExceeded { limit });
            }
        }

        if let Some(limit) = self.daily_limit {
            let used = self
                .history
                .count_sessions_since(username, now - Duration::hours(24))
                .await?;

            if used >= u64::from(limit) {
                log::info!("24h prediction quota of {limit} reached for user '{username}'");
                return Err(QuotaError::DailyExceeded { limit });
            }
        }

        Ok(())
    }
}

/// Midnight UTC on the first day of the month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or_else(|| now - Duration::days(i64::from(now.day0())))
}
