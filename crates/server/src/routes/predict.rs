use std::{path::PathBuf, time::Instant};

use axum::{
    Json,
    extract::{Multipart, State},
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde::Serialize;
use storage::{ImageKind, NewDetection, PredictionSession};
use uuid::Uuid;

use crate::{
    auth::Credentials,
    error::{ApiError, ApiResult},
    state::AppState,
    upload::{UploadName, sniff, validate_name, verify},
};

#[derive(Debug, Serialize)]
pub(crate) struct PredictResponse {
    prediction_uid: String,
    detection_count: usize,
    labels: Vec<String>,
    time_took: f64,
}

struct Upload {
    name: UploadName,
    bytes: Vec<u8>,
}

/// Runs detection on an uploaded image and records the result.
///
/// Credentials are optional. When sent, quotas are enforced before anything
/// else, then unknown users are registered and known ones verified.
pub(crate) async fn predict(
    State(state): State<AppState>,
    credentials: Option<Credentials>,
    mut multipart: Multipart,
) -> ApiResult<Json<PredictResponse>> {
    let username = match credentials {
        Some(credentials) => {
            state.quota.enforce(&credentials.username).await?;
            register_or_verify(&state, &credentials).await?;

            Some(credentials.username)
        }
        None => None,
    };

    let Upload { name, bytes } = read_upload(&mut multipart, state.max_upload_bytes).await?;

    if sniff(&bytes)? != name.format {
        return Err(ApiError::UnsupportedMediaType("Invalid or corrupted image"));
    }

    verify(&bytes, name.format)?;

    let uid = Uuid::new_v4().to_string();
    let file_name = format!("{uid}{}", name.extension);

    let original_dir = state.image_dir(ImageKind::Original);
    let predicted_dir = state.image_dir(ImageKind::Predicted);
    tokio::fs::create_dir_all(&original_dir).await?;
    tokio::fs::create_dir_all(&predicted_dir).await?;

    let original_path = original_dir.join(&file_name);
    let predicted_path = predicted_dir.join(&file_name);

    tokio::fs::write(&original_path, &bytes).await?;

    let stored = StoredUpload {
        uid,
        file_name,
        original_path,
        predicted_path,
    };

    match detect_and_persist(&state, &stored, bytes, username).await {
        Ok(response) => Ok(Json(response)),
        Err(error) => {
            // A failed upload leaves no files behind.
            for path in [&stored.original_path, &stored.predicted_path] {
                match tokio::fs::remove_file(path).await {
                    Ok(()) => (),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
                    Err(e) => log::debug!("Failed to remove {}: {e}", path.display()),
                }
            }

            Err(error)
        }
    }
}

struct StoredUpload {
    uid: String,
    file_name: String,
    original_path: PathBuf,
    predicted_path: PathBuf,
}

/// Everything after the original image is on disk.
async fn detect_and_persist(
    state: &AppState,
    stored: &StoredUpload,
    bytes: Vec<u8>,
    username: Option<String>,
) -> ApiResult<PredictResponse> {
    let started = Instant::now();

    let detection = state.detector.detect(bytes.clone(), &stored.file_name).await?;

    let time_took = (started.elapsed().as_secs_f64() * 100.0).round() / 100.0;
    let labels = detection.labels();

    let annotated = detection.annotated_image.as_deref().unwrap_or(bytes.as_slice());
    tokio::fs::write(&stored.predicted_path, annotated).await?;

    let uid = &stored.uid;

    let session = PredictionSession {
        uid: uid.clone(),
        timestamp: Utc::now(),
        original_image: Some(stored.original_path.display().to_string()),
        predicted_image: Some(stored.predicted_path.display().to_string()),
        username,
    };

    state.store.save_session(&session).await?;

    let detections: Vec<_> = detection
        .objects
        .iter()
        .map(|object| NewDetection {
            label: object.label.clone(),
            score: object.score,
            bbox: object.bbox_string(),
        })
        .collect();

    state.store.save_detections(uid, &detections).await?;

    log::debug!("Prediction {uid} stored with {} detections", detections.len());

    Ok(PredictResponse {
        prediction_uid: uid.clone(),
        detection_count: detections.len(),
        labels,
        time_took,
    })
}

async fn register_or_verify(state: &AppState, credentials: &Credentials) -> ApiResult<()> {
    match state.store.get_user(&credentials.username).await? {
        None => {
            log::info!("Registering user '{}'", credentials.username);

            state
                .store
                .create_user(&credentials.username, credentials.password.expose_secret())
                .await?;

            Ok(())
        }
        Some(user) if credentials.matches(&user.password) => Ok(()),
        Some(_) => Err(ApiError::Unauthorized),
    }
}

/// Reads the `file` field, enforcing the size cap while streaming.
async fn read_upload(multipart: &mut Multipart, max_bytes: usize) -> ApiResult<Upload> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, max_bytes))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let name = validate_name(field.content_type(), &file_name)?;

        let mut bytes = Vec::new();

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::from_multipart(e, max_bytes))?
        {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(ApiError::too_large(max_bytes));
            }

            bytes.extend_from_slice(&chunk);
        }

        return Ok(Upload { name, bytes });
    }

    Err(ApiError::BadRequest("Missing file field".to_string()))
}

#[cfg(test)]
mod tests {
    use std::{io::Cursor, path::Path, sync::Arc};

    use async_trait::async_trait;
    use axum::body::Body;
    use chrono::DateTime;
    use config::{CacheConfig, QuotaConfig};
    use detector::{DetectedObject, Detection, Detector, DetectorError};
    use http::{Request, StatusCode, header::CONTENT_TYPE};
    use rate_limit::QuotaEnforcer;
    use storage::{
        LabelScore, PredictionStore, PredictionSummary, RetainedFileRef, RetainedFiles, ScoredPrediction,
        SessionHistory, StoreError, StoreResult, User,
    };
    use tower::ServiceExt;

    use crate::cache::PredictionCache;

    use super::*;

    const BOUNDARY: &str = "lookout-test-boundary";

    #[derive(Clone, Copy, PartialEq)]
    enum FailAt {
        Session,
        Detections,
    }

    struct FailingStore {
        fail_at: FailAt,
    }

    impl FailingStore {
        fn fail(&self, step: FailAt) -> StoreResult<()> {
            if self.fail_at == step {
                Err(StoreError::Io(std::io::Error::other("database is locked")))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SessionHistory for FailingStore {
        async fn count_sessions_since(&self, _: &str, _: DateTime<Utc>) -> StoreResult<u64> {
            Ok(0)
        }
    }

    #[async_trait]
    impl RetainedFiles for FailingStore {
        async fn expired_sessions(&self, _: DateTime<Utc>, _: u32, _: u64) -> StoreResult<Vec<RetainedFileRef>> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl PredictionStore for FailingStore {
        async fn get_user(&self, _: &str) -> StoreResult<Option<User>> {
            Ok(None)
        }

        async fn create_user(&self, _: &str, _: &str) -> StoreResult<()> {
            Ok(())
        }

        async fn save_session(&self, _: &PredictionSession) -> StoreResult<()> {
            self.fail(FailAt::Session)
        }

        async fn save_detections(&self, _: &str, _: &[NewDetection]) -> StoreResult<()> {
            self.fail(FailAt::Detections)
        }

        async fn session(&self, _: &str) -> StoreResult<Option<PredictionSession>> {
            Ok(None)
        }

        async fn session_for_user(&self, _: &str, _: &str) -> StoreResult<Option<PredictionSession>> {
            Ok(None)
        }

        async fn session_by_image(&self, _: ImageKind, _: &str, _: &str) -> StoreResult<Option<PredictionSession>> {
            Ok(None)
        }

        async fn predictions_by_label(&self, _: &str, _: &str) -> StoreResult<Vec<PredictionSummary>> {
            Ok(Vec::new())
        }

        async fn predictions_by_score(&self, _: &str, _: f64) -> StoreResult<Vec<ScoredPrediction>> {
            Ok(Vec::new())
        }

        async fn labels_since(&self, _: &str, _: DateTime<Utc>) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }

        async fn detections_since(&self, _: &str, _: DateTime<Utc>) -> StoreResult<Vec<LabelScore>> {
            Ok(Vec::new())
        }

        async fn delete_session(&self, _: &str, _: &str) -> StoreResult<Option<PredictionSession>> {
            Ok(None)
        }
    }

    struct OneDog;

    #[async_trait]
    impl Detector for OneDog {
        async fn detect(&self, _: Vec<u8>, _: &str) -> Result<Detection, DetectorError> {
            Ok(Detection {
                objects: vec![DetectedObject {
                    label: "dog".to_string(),
                    score: 0.9,
                    bbox: [1.0, 2.0, 30.0, 40.0],
                }],
                annotated_image: Some(b"annotated".to_vec()),
            })
        }
    }

    fn state(store: FailingStore, upload_root: &Path) -> AppState {
        let store = Arc::new(store);

        AppState {
            store: store.clone(),
            quota: Arc::new(QuotaEnforcer::new(store, &QuotaConfig::default())),
            detector: Arc::new(OneDog),
            cache: PredictionCache::new(&CacheConfig::default()),
            upload_root: Arc::new(upload_root.to_path_buf()),
            max_upload_bytes: 1024 * 1024,
        }
    }

    fn png() -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image::RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 255]))
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();

        bytes.into_inner()
    }

    fn upload_request(image: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"photo.png\"\r\n\
             Content-Type: image/png\r\n\r\n"
        )
        .into_bytes();

        body.extend_from_slice(image);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    async fn upload_with_failure(fail_at: FailAt) {
        let dir = tempfile::tempdir().unwrap();
        let app = crate::routes::router(state(FailingStore { fail_at }, dir.path()), None);

        let response = app.oneshot(upload_request(&png())).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(dir.path().join("predicted").is_dir());
        assert_eq!(files_in(&dir.path().join("original")), 0);
        assert_eq!(files_in(&dir.path().join("predicted")), 0);
    }

    #[tokio::test]
    async fn failed_session_write_removes_both_images() {
        upload_with_failure(FailAt::Session).await;
    }

    #[tokio::test]
    async fn failed_detection_write_removes_both_images() {
        upload_with_failure(FailAt::Detections).await;
    }

    #[tokio::test]
    async fn corrupted_image_is_never_written() {
        let dir = tempfile::tempdir().unwrap();
        let app = crate::routes::router(state(FailingStore { fail_at: FailAt::Session }, dir.path()), None);

        let mut corrupted = png();
        corrupted.truncate(20);

        let response = app.oneshot(upload_request(&corrupted)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(files_in(&dir.path().join("original")), 0);
    }
}
