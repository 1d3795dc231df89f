//! Error types for admission and quota checks.

use std::time::Duration;

use storage::StoreError;

/// Rejections raised by the admission gate.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Too many requests inside the burst window.
    #[error("Rate limit exceeded")]
    BurstLimitExceeded {
        /// Configured burst limit.
        limit: u32,
        /// Time until the oldest burst entry leaves the window.
        retry_after: Duration,
    },

    /// Too many uploads inside the upload window.
    #[error("Upload quota exceeded ({limit}/min)")]
    UploadLimitExceeded {
        /// Configured upload limit.
        limit: u32,
        /// Time until the oldest upload entry leaves the window.
        retry_after: Duration,
    },
}

impl RateLimitError {
    /// The limit that was exceeded.
    pub fn limit(&self) -> u32 {
        match self {
            Self::BurstLimitExceeded { limit, .. } => *limit,
            Self::UploadLimitExceeded { limit, .. } => *limit,
        }
    }

    /// Get the retry-after duration.
    pub fn retry_after(&self) -> Duration {
        match self {
            Self::BurstLimitExceeded { retry_after, .. } => *retry_after,
            Self::UploadLimitExceeded { retry_after, .. } => *retry_after,
        }
    }

    /// Whole seconds a client should wait, rounded up.
    pub fn reset_secs(&self) -> u64 {
        let retry_after = self.retry_after();
        let secs = retry_after.as_secs();

        if retry_after.subsec_nanos() > 0 { secs + 1 } else { secs }
    }
}

/// Rejections raised by the quota enforcer.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// The user reached the cap for the current calendar month.
    #[error("Monthly prediction quota exceeded")]
    MonthlyExceeded {
        /// Configured monthly cap.
        limit: u32,
    },

    /// The user reached the cap for the trailing 24 hours.
    #[error("24h prediction quota exceeded")]
    DailyExceeded {
        /// Configured daily cap.
        limit: u32,
    },

    /// The session history could not be read.
    #[error("Quota lookup failed: {0}")]
    Store(#[from] StoreError),
}
