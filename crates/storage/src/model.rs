//! Records kept by the prediction store.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};

/// A registered API user.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    /// Unique login name.
    pub username: String,
    /// Opaque credential, compared verbatim.
    pub password: String,
}

/// One uploaded image together with its annotated counterpart.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PredictionSession {
    /// Prediction identifier.
    pub uid: String,
    /// Creation time, always UTC.
    pub timestamp: DateTime<Utc>,
    /// Path of the uploaded image.
    pub original_image: Option<String>,
    /// Path of the annotated image.
    pub predicted_image: Option<String>,
    /// Owner, absent for anonymous uploads.
    pub username: Option<String>,
}

/// A detected object to be attached to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDetection {
    /// Class label.
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub score: f64,
    /// Bounding box serialised as `[x1, y1, x2, y2]`.
    pub bbox: String,
}

/// A session listed by identifier and creation time.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct PredictionSummary {
    /// Prediction identifier.
    pub uid: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

/// A detection score together with its owning session.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ScoredPrediction {
    /// Prediction identifier.
    pub uid: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Detection confidence.
    pub score: f64,
}

/// Label and score of a single detection.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LabelScore {
    /// Class label.
    pub label: String,
    /// Detection confidence.
    pub score: f64,
}

/// The file references of a session, as seen by the retention sweep.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct RetainedFileRef {
    /// Path of the uploaded image.
    pub original_image: Option<String>,
    /// Path of the annotated image.
    pub predicted_image: Option<String>,
    /// Session creation time.
    pub timestamp: DateTime<Utc>,
}

impl RetainedFileRef {
    /// Both references, skipping the ones never written.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        [self.original_image.as_deref(), self.predicted_image.as_deref()]
            .into_iter()
            .flatten()
            .filter(|path| !path.is_empty())
    }
}

/// Which of the two images of a session is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// The image as uploaded.
    Original,
    /// The annotated image.
    Predicted,
}

impl ImageKind {
    /// Directory name below the upload root.
    pub fn as_str(self) -> &'static str {
        match self {
            ImageKind::Original => "original",
            ImageKind::Predicted => "predicted",
        }
    }

    pub(crate) fn column(self) -> &'static str {
        match self {
            ImageKind::Original => "original_image",
            ImageKind::Predicted => "predicted_image",
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an image kind is neither `original` nor `predicted`.
#[derive(Debug, thiserror::Error)]
#[error("Invalid image type: {0}")]
pub struct InvalidImageKind(pub String);

impl FromStr for ImageKind {
    type Err = InvalidImageKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(ImageKind::Original),
            "predicted" => Ok(ImageKind::Predicted),
            other => Err(InvalidImageKind(other.to_string())),
        }
    }
}
