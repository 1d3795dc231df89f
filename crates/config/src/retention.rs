//! Retention sweep configuration.

use std::path::PathBuf;

use serde::Deserialize;

/// Settings for reclaiming upload files that belong to aged sessions.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionConfig {
    /// Whether the daily sweep runs.
    pub enabled: bool,
    /// Root of the managed upload tree. Nothing outside it is ever deleted.
    pub upload_root: PathBuf,
    /// Sessions older than this many days lose their files.
    pub max_age_days: u32,
    /// Sweep the upload tree by file modification time when the database
    /// cannot be read.
    pub mtime_fallback: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            upload_root: PathBuf::from("uploads"),
            max_age_days: 90,
            mtime_fallback: false,
        }
    }
}
