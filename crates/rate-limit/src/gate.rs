//! Admission gate applied to every inbound request.

use std::{sync::Arc, time::Duration};

use config::RateLimitConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    error::RateLimitError,
    request::{AdmissionRequest, RouteClass},
    window::{Acquire, WindowCounter},
};

/// Length of the request burst window.
pub const BURST_WINDOW: Duration = Duration::from_secs(1);

/// Length of the upload throttling window.
pub const UPLOAD_WINDOW: Duration = Duration::from_secs(60);

/// Reset hint attached to admitted responses.
pub const RESET_HINT_SECS: u64 = 60;

/// Telemetry for an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Configured burst limit.
    pub limit: u32,
    /// Burst capacity left right after admission.
    pub remaining: u32,
}

/// Decides pass or reject for inbound requests.
///
/// Built once at startup and shared by handle. The burst and upload windows
/// live in separate counters so a key never collides across window types.
pub struct AdmissionGate {
    requests_per_second: u32,
    uploads_per_minute: u32,
    burst: WindowCounter,
    uploads: WindowCounter,
}

impl AdmissionGate {
    /// Creates a gate with the configured limits.
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            requests_per_second: config.requests_per_second,
            uploads_per_minute: config.uploads_per_minute,
            burst: WindowCounter::new(BURST_WINDOW),
            uploads: WindowCounter::new(UPLOAD_WINDOW),
        }
    }

    /// The burst limit reported in response headers.
    pub fn limit(&self) -> u32 {
        self.requests_per_second
    }

    /// Admits or rejects a request.
    ///
    /// The burst window is checked first. Upload routes are then checked
    /// against the upload window. A rejected request records nothing in the
    /// window that rejected it.
    pub fn check(&self, request: &AdmissionRequest) -> Result<Admission, RateLimitError> {
        let remaining = match self.burst.try_acquire(&request.key, self.requests_per_second) {
            Acquire::Allowed { remaining } => remaining,
            Acquire::Denied { retry_after } => {
                log::debug!("Burst limit exceeded, retry after {retry_after:?}");

                return Err(RateLimitError::BurstLimitExceeded {
                    limit: self.requests_per_second,
                    retry_after,
                });
            }
        };

        if request.route == RouteClass::Upload
            && let Acquire::Denied { retry_after } = self.uploads.try_acquire(&request.key, self.uploads_per_minute)
        {
            log::debug!("Upload limit exceeded, retry after {retry_after:?}");

            return Err(RateLimitError::UploadLimitExceeded {
                limit: self.uploads_per_minute,
                retry_after,
            });
        }

        Ok(Admission {
            limit: self.requests_per_second,
            remaining,
        })
    }

    /// Burst capacity currently left for a key.
    pub fn remaining(&self, key: &str) -> u32 {
        let used = u32::try_from(self.burst.count(key)).unwrap_or(u32::MAX);
        self.requests_per_second.saturating_sub(used)
    }

    /// Drops keys with empty windows from both counters.
    pub fn compact(&self) -> usize {
        self.burst.compact() + self.uploads.compact()
    }

    /// Spawns a task compacting the counters every `interval` until cancelled.
    pub fn spawn_compaction(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        let removed = self.compact();

                        if removed > 0 {
                            log::debug!("Dropped {removed} idle rate limit keys");
                        }
                    }
                }
            }

            log::debug!("Rate limit compaction stopped");
        })
    }
}
