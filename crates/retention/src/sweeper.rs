//! Daily retention sweep over the upload root.

use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use config::RetentionConfig;
use storage::RetainedFiles;
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    SweepError,
    mtime::purge_by_mtime,
    purge::{cutoff, purge_until},
};

/// Time between two scheduled sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Recurring background purge of aged upload files.
///
/// The first run happens one interval after the sweeper is spawned.
pub struct RetentionSweeper {
    files: Arc<dyn RetainedFiles>,
    upload_root: PathBuf,
    max_age_days: u32,
    mtime_fallback: bool,
}

impl RetentionSweeper {
    /// Creates a sweeper over the given session listing.
    pub fn new(files: Arc<dyn RetainedFiles>, config: &RetentionConfig) -> Self {
        Self {
            files,
            upload_root: config.upload_root.clone(),
            max_age_days: config.max_age_days,
            mtime_fallback: config.mtime_fallback,
        }
    }

    /// Runs one sweep now. Returns how many files were removed.
    pub async fn run_once(&self, shutdown: &CancellationToken) -> Result<usize, SweepError> {
        let cutoff = cutoff(Utc::now(), self.max_age_days);

        match purge_until(self.files.as_ref(), &self.upload_root, cutoff, shutdown).await {
            Ok(removed) => Ok(removed),
            Err(SweepError::Store(error)) if self.mtime_fallback => {
                log::warn!("Retention sweep could not read sessions, sweeping by modification time: {error}");

                let root = self.upload_root.clone();
                let max_age_days = self.max_age_days;

                Ok(tokio::task::spawn_blocking(move || purge_by_mtime(&root, max_age_days)).await?)
            }
            Err(error) => Err(error),
        }
    }

    /// Spawns the daily sweep, stopping when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        self.spawn_every(SWEEP_INTERVAL, shutdown)
    }

    /// Spawns the sweep with a custom period.
    pub fn spawn_every(self, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval_at(Instant::now() + period, period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            log::debug!("Retention sweeper scheduled every {period:?} for {}", self.upload_root.display());

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tick.tick() => match self.run_once(&shutdown).await {
                        Ok(removed) => log::info!("Retention sweep removed {removed} files"),
                        Err(error) => log::warn!("Retention sweep failed, retrying on the next run: {error}"),
                    },
                }
            }

            log::debug!("Retention sweeper stopped");
        })
    }
}
