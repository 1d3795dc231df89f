use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use config::DetectorConfig;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;

use crate::{DetectedObject, Detection, Detector, DetectorError};

/// Calls a detection backend over HTTP.
///
/// The image is posted as the `file` field of a multipart form. The backend
/// answers with JSON:
///
/// ```json
/// {"detections": [{"label": "dog", "score": 0.91, "bbox": [10, 20, 110, 220]}],
///  "annotated_image": "<base64>"}
/// ```
pub struct HttpDetector {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<DetectedObject>,
    #[serde(default)]
    annotated_image: Option<String>,
}

impl HttpDetector {
    /// Creates a client for the configured backend.
    pub fn new(config: &DetectorConfig) -> Result<Self, DetectorError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DetectorError::Client(e.to_string()))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    async fn detect(&self, image: Vec<u8>, file_name: &str) -> Result<Detection, DetectorError> {
        let part = Part::bytes(image).file_name(file_name.to_string());
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| DetectorError::Connection(e.to_string()))?;

        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            log::error!("Detection backend error ({status}): {message}");

            return Err(DetectorError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))?;

        decode(&text)
    }
}

fn decode(body: &str) -> Result<Detection, DetectorError> {
    let response: DetectResponse = serde_json::from_str(body).map_err(|e| {
        log::error!("Failed to parse detection response: {e}");
        DetectorError::InvalidResponse(e.to_string())
    })?;

    let annotated_image = match response.annotated_image {
        Some(encoded) if !encoded.is_empty() => Some(
            STANDARD
                .decode(encoded)
                .map_err(|e| DetectorError::InvalidResponse(format!("annotated image: {e}")))?,
        ),
        _ => None,
    };

    Ok(Detection {
        objects: response.detections,
        annotated_image,
    })
}
