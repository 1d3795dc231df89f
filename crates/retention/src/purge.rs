//! Database-driven purge of aged upload files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use storage::RetainedFiles;
use tokio_util::sync::CancellationToken;

use crate::SweepError;

/// Sessions fetched per query.
pub const BATCH_SIZE: u32 = 500;

/// Deletes the files of every session older than `max_age_days`.
///
/// Returns how many files were removed. Session records are left in place.
pub async fn purge(files: &dyn RetainedFiles, upload_root: &Path, max_age_days: u32) -> Result<usize, SweepError> {
    purge_until(files, upload_root, cutoff(Utc::now(), max_age_days), &CancellationToken::new()).await
}

/// The instant before which sessions count as expired.
pub fn cutoff(now: DateTime<Utc>, max_age_days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(max_age_days))
}

/// Deletes the files of every session created before `cutoff`.
///
/// Batches are processed one after another. Cancellation is observed between
/// batches: whatever was deleted stays deleted, nothing else is touched.
pub(crate) async fn purge_until(
    files: &dyn RetainedFiles,
    upload_root: &Path,
    cutoff: DateTime<Utc>,
    shutdown: &CancellationToken,
) -> Result<usize, SweepError> {
    let Ok(root) = tokio::fs::canonicalize(upload_root).await else {
        log::debug!("Upload root {} does not exist, nothing to purge", upload_root.display());
        return Ok(0);
    };

    let mut removed = 0;
    let mut offset = 0;

    loop {
        if shutdown.is_cancelled() {
            log::debug!("Retention purge cancelled after {removed} files");
            break;
        }

        let batch = files.expired_sessions(cutoff, BATCH_SIZE, offset).await?;

        if batch.is_empty() {
            break;
        }

        for session in &batch {
            for path in session.paths() {
                if remove_under(&root, path).await {
                    removed += 1;
                }
            }
        }

        offset += batch.len() as u64;
    }

    Ok(removed)
}

/// Removes `path` if it resolves to a file strictly below `root`.
async fn remove_under(root: &Path, path: &str) -> bool {
    let Some(resolved) = resolve_under(root, path).await else {
        return false;
    };

    match tokio::fs::remove_file(&resolved).await {
        Ok(()) => true,
        Err(error) => {
            log::debug!("Failed to remove {}: {error}", resolved.display());
            false
        }
    }
}

async fn resolve_under(root: &Path, path: &str) -> Option<PathBuf> {
    let resolved = tokio::fs::canonicalize(path).await.ok()?;

    if resolved.starts_with(root) && resolved != root {
        Some(resolved)
    } else {
        log::debug!("Refusing to remove {path}: outside of {}", root.display());
        None
    }
}
