//! Persistence for users, prediction sessions and their detections.
//!
//! The quota enforcer and the retention sweeper only see the narrow
//! [`SessionHistory`] and [`RetainedFiles`] seams; the HTTP handlers use the
//! full [`PredictionStore`].

#![deny(missing_docs)]

mod error;
mod model;
mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use error::{StoreError, StoreResult};
pub use model::{
    ImageKind, InvalidImageKind, LabelScore, NewDetection, PredictionSession, PredictionSummary, RetainedFileRef,
    ScoredPrediction, User,
};
pub use sqlite::SqliteStore;

/// Counts of persisted sessions per user, the source of truth for quotas.
#[async_trait]
pub trait SessionHistory: Send + Sync {
    /// Number of sessions owned by `username` created at or after `since`.
    async fn count_sessions_since(&self, username: &str, since: DateTime<Utc>) -> StoreResult<u64>;
}

/// Paged listing of file references belonging to aged sessions.
#[async_trait]
pub trait RetainedFiles: Send + Sync {
    /// Sessions created strictly before `cutoff`, oldest first.
    async fn expired_sessions(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
        offset: u64,
    ) -> StoreResult<Vec<RetainedFileRef>>;
}

/// Full prediction history store used by the HTTP handlers.
#[async_trait]
pub trait PredictionStore: SessionHistory + RetainedFiles {
    /// Looks up a user by name.
    async fn get_user(&self, username: &str) -> StoreResult<Option<User>>;

    /// Registers a user.
    async fn create_user(&self, username: &str, password: &str) -> StoreResult<()>;

    /// Persists a new session.
    async fn save_session(&self, session: &PredictionSession) -> StoreResult<()>;

    /// Attaches detections to an existing session in one transaction.
    async fn save_detections(&self, uid: &str, detections: &[NewDetection]) -> StoreResult<()>;

    /// Looks up a session regardless of owner.
    async fn session(&self, uid: &str) -> StoreResult<Option<PredictionSession>>;

    /// Looks up a session owned by `username`.
    async fn session_for_user(&self, uid: &str, username: &str) -> StoreResult<Option<PredictionSession>>;

    /// The session owning the given image path, if it belongs to `username`.
    async fn session_by_image(
        &self,
        kind: ImageKind,
        path: &str,
        username: &str,
    ) -> StoreResult<Option<PredictionSession>>;

    /// Distinct sessions of `username` with at least one detection of `label`.
    async fn predictions_by_label(&self, username: &str, label: &str) -> StoreResult<Vec<PredictionSummary>>;

    /// Every detection of `username` scoring at least `min_score`.
    async fn predictions_by_score(&self, username: &str, min_score: f64) -> StoreResult<Vec<ScoredPrediction>>;

    /// Distinct labels detected in sessions of `username` since `since`.
    async fn labels_since(&self, username: &str, since: DateTime<Utc>) -> StoreResult<Vec<String>>;

    /// Label and score of every detection in sessions of `username` since `since`.
    async fn detections_since(&self, username: &str, since: DateTime<Utc>) -> StoreResult<Vec<LabelScore>>;

    /// Removes a session owned by `username` and its detections.
    ///
    /// Returns the removed session so the caller can reclaim its files.
    async fn delete_session(&self, uid: &str, username: &str) -> StoreResult<Option<PredictionSession>>;
}
