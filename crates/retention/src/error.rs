use storage::StoreError;

/// Errors that end a sweep run early.
///
/// Failures on individual files are never reported here; they are skipped.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// Aged sessions could not be listed.
    #[error("Failed to list expired sessions: {0}")]
    Store(#[from] StoreError),

    /// The filesystem sweep task did not complete.
    #[error("Filesystem sweep aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}
