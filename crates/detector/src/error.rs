//! Errors raised while talking to the detection backend.

/// Failures of the detection backend.
#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    /// The backend could not be reached.
    #[error("Detection backend unreachable: {0}")]
    Connection(String),

    /// The backend answered with a non-success status.
    #[error("Detection backend returned {status}: {message}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The backend answer could not be decoded.
    #[error("Invalid detection response: {0}")]
    InvalidResponse(String),

    /// The HTTP client could not be built.
    #[error("Failed to build detection client: {0}")]
    Client(String),
}
