//! Error types for persistence.

/// Errors raised by a prediction store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected or failed a query.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Preparing the database location failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
