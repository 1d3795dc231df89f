//! Detection backend configuration.

use std::time::Duration;

use duration_str::deserialize_duration;
use serde::Deserialize;

/// Where and how to reach the object detection backend.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Endpoint accepting a multipart image and returning detections as JSON.
    pub url: String,
    /// Request timeout for a single detection call.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8081/detect".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}
