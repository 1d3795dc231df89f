//! Filesystem-only sweep by modification time.

use std::{
    path::Path,
    time::{Duration, SystemTime},
};

use walkdir::WalkDir;

/// Deletes every file below `base_dir` not modified in the last
/// `max_age_days` days. Returns how many files were removed.
///
/// Needs no database. Unreadable entries and failed deletions are skipped.
pub fn purge_by_mtime(base_dir: &Path, max_age_days: u32) -> usize {
    let max_age = Duration::from_secs(u64::from(max_age_days) * 24 * 60 * 60);
    let cutoff = SystemTime::now().checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);

    purge_modified_before(base_dir, cutoff)
}

pub(crate) fn purge_modified_before(base_dir: &Path, cutoff: SystemTime) -> usize {
    let mut removed = 0;

    for entry in WalkDir::new(base_dir).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }

        let modified = match entry.metadata().map(|metadata| metadata.modified()) {
            Ok(Ok(modified)) => modified,
            _ => continue,
        };

        if modified >= cutoff {
            continue;
        }

        match std::fs::remove_file(entry.path()) {
            Ok(()) => removed += 1,
            Err(error) => log::debug!("Failed to remove {}: {error}", entry.path().display()),
        }
    }

    removed
}
