//! Object detection collaborator.
//!
//! The service never runs a model in-process. A [`Detector`] takes the raw
//! image bytes and returns the detected objects plus an annotated rendering.

#![deny(missing_docs)]

mod error;
mod http;
mod labels;

use async_trait::async_trait;

pub use error::DetectorError;
pub use http::HttpDetector;
pub use labels::{SUPPORTED_LABELS, is_supported_label};

/// A single detected object.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct DetectedObject {
    /// Class label, one of [`SUPPORTED_LABELS`].
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub score: f64,
    /// Bounding box as `[x1, y1, x2, y2]` in pixels.
    pub bbox: [f64; 4],
}

impl DetectedObject {
    /// The bounding box rendered as `[x1, y1, x2, y2]`.
    pub fn bbox_string(&self) -> String {
        let [x1, y1, x2, y2] = self.bbox;
        format!("[{x1}, {y1}, {x2}, {y2}]")
    }
}

/// Result of running detection on one image.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    /// Objects in detection order.
    pub objects: Vec<DetectedObject>,
    /// Image with the detections drawn on it, if the backend produced one.
    pub annotated_image: Option<Vec<u8>>,
}

impl Detection {
    /// Labels in detection order, duplicates included.
    pub fn labels(&self) -> Vec<String> {
        self.objects.iter().map(|object| object.label.clone()).collect()
    }
}

/// Runs object detection on an image.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Detects objects in `image`. `file_name` carries the extension of the upload.
    async fn detect(&self, image: Vec<u8>, file_name: &str) -> Result<Detection, DetectorError>;
}
