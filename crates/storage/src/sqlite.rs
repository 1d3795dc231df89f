//! SQLite-backed prediction store.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};

use crate::{
    ImageKind, LabelScore, NewDetection, PredictionSession, PredictionStore, PredictionSummary, RetainedFileRef,
    RetainedFiles, ScoredPrediction, SessionHistory, StoreResult, User,
};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY,
    password TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS prediction_sessions (
    uid TEXT PRIMARY KEY,
    timestamp TEXT NOT NULL,
    original_image TEXT,
    predicted_image TEXT,
    username TEXT REFERENCES users(username)
);

CREATE INDEX IF NOT EXISTS idx_prediction_sessions_user_time
    ON prediction_sessions(username, timestamp);

CREATE INDEX IF NOT EXISTS idx_prediction_sessions_time
    ON prediction_sessions(timestamp);

CREATE TABLE IF NOT EXISTS detection_objects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    prediction_uid TEXT NOT NULL REFERENCES prediction_sessions(uid),
    label TEXT NOT NULL,
    score REAL NOT NULL,
    box TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_detection_objects_prediction
    ON detection_objects(prediction_uid);
"#;

/// SQLite-based prediction store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Connects to the database at `url`, creating it and its schema if missing.
    pub async fn connect(url: &str, max_connections: u32) -> StoreResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        if let Some(parent) = opts.get_filename().parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        log::debug!("Connected prediction store at {url}");

        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Checks database connectivity.
    pub async fn health_check(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SessionHistory for SqliteStore {
    async fn count_sessions_since(&self, username: &str, since: DateTime<Utc>) -> StoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM prediction_sessions WHERE username = ? AND timestamp >= ?")
                .bind(username)
                .bind(since)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl RetainedFiles for SqliteStore {
    async fn expired_sessions(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
        offset: u64,
    ) -> StoreResult<Vec<RetainedFileRef>> {
        let rows = sqlx::query_as::<_, RetainedFileRef>(
            "SELECT original_image, predicted_image, timestamp FROM prediction_sessions \
             WHERE timestamp < ? ORDER BY timestamp, uid LIMIT ? OFFSET ?",
        )
        .bind(cutoff)
        .bind(i64::from(limit))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[async_trait]
impl PredictionStore for SqliteStore {
    async fn get_user(&self, username: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT username, password FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn create_user(&self, username: &str, password: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO users (username, password) VALUES (?, ?)")
            .bind(username)
            .bind(password)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn save_session(&self, session: &PredictionSession) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO prediction_sessions (uid, timestamp, original_image, predicted_image, username) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.uid)
        .bind(session.timestamp)
        .bind(&session.original_image)
        .bind(&session.predicted_image)
        .bind(&session.username)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_detections(&self, uid: &str, detections: &[NewDetection]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for detection in detections {
            sqlx::query("INSERT INTO detection_objects (prediction_uid, label, score, box) VALUES (?, ?, ?, ?)")
                .bind(uid)
                .bind(&detection.label)
                .bind(detection.score)
                .bind(&detection.bbox)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(())
    }

    async fn session(&self, uid: &str) -> StoreResult<Option<PredictionSession>> {
        let session = sqlx::query_as::<_, PredictionSession>("SELECT * FROM prediction_sessions WHERE uid = ?")
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    async fn session_for_user(&self, uid: &str, username: &str) -> StoreResult<Option<PredictionSession>> {
        let session =
            sqlx::query_as::<_, PredictionSession>("SELECT * FROM prediction_sessions WHERE uid = ? AND username = ?")
                .bind(uid)
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        Ok(session)
    }

    async fn session_by_image(
        &self,
        kind: ImageKind,
        path: &str,
        username: &str,
    ) -> StoreResult<Option<PredictionSession>> {
        let query = format!(
            "SELECT * FROM prediction_sessions WHERE {} = ? AND username = ?",
            kind.column()
        );

        let session = sqlx::query_as::<_, PredictionSession>(&query)
            .bind(path)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    async fn predictions_by_label(&self, username: &str, label: &str) -> StoreResult<Vec<PredictionSummary>> {
        let rows = sqlx::query_as::<_, PredictionSummary>(
            "SELECT DISTINCT s.uid, s.timestamp FROM prediction_sessions s \
             JOIN detection_objects d ON s.uid = d.prediction_uid \
             WHERE d.label = ? AND s.username = ? ORDER BY s.timestamp, s.uid",
        )
        .bind(label)
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn predictions_by_score(&self, username: &str, min_score: f64) -> StoreResult<Vec<ScoredPrediction>> {
        let rows = sqlx::query_as::<_, ScoredPrediction>(
            "SELECT s.uid, s.timestamp, d.score FROM prediction_sessions s \
             JOIN detection_objects d ON s.uid = d.prediction_uid \
             WHERE d.score >= ? AND s.username = ? ORDER BY s.timestamp, d.id",
        )
        .bind(min_score)
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn labels_since(&self, username: &str, since: DateTime<Utc>) -> StoreResult<Vec<String>> {
        let labels = sqlx::query_scalar(
            "SELECT DISTINCT label FROM detection_objects WHERE prediction_uid IN \
             (SELECT uid FROM prediction_sessions WHERE timestamp >= ? AND username = ?) ORDER BY label",
        )
        .bind(since)
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(labels)
    }

    async fn detections_since(&self, username: &str, since: DateTime<Utc>) -> StoreResult<Vec<LabelScore>> {
        let rows = sqlx::query_as::<_, LabelScore>(
            "SELECT label, score FROM detection_objects WHERE prediction_uid IN \
             (SELECT uid FROM prediction_sessions WHERE timestamp >= ? AND username = ?) ORDER BY id",
        )
        .bind(since)
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn delete_session(&self, uid: &str, username: &str) -> StoreResult<Option<PredictionSession>> {
        let mut tx = self.pool.begin().await?;

        let session =
            sqlx::query_as::<_, PredictionSession>("SELECT * FROM prediction_sessions WHERE uid = ? AND username = ?")
                .bind(uid)
                .bind(username)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(session) = session else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM detection_objects WHERE prediction_uid = ?")
            .bind(uid)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM prediction_sessions WHERE uid = ? AND username = ?")
            .bind(uid)
            .bind(username)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(session))
    }
}
