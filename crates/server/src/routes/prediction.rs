use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use http::{HeaderMap, header::ACCEPT, header::CONTENT_TYPE};
use serde::Serialize;
use storage::PredictionSession;

use crate::{
    auth::AuthenticatedUser,
    error::{ApiError, ApiResult},
    state::AppState,
    upload::ImageFormat,
};

#[derive(Debug, Serialize)]
pub(crate) struct PredictionResponse {
    uid: String,
    timestamp: DateTime<Utc>,
    original_image: Option<String>,
    predicted_image: Option<String>,
}

impl From<PredictionSession> for PredictionResponse {
    fn from(session: PredictionSession) -> Self {
        Self {
            uid: session.uid,
            timestamp: session.timestamp,
            original_image: session.original_image,
            predicted_image: session.predicted_image,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct DeleteResponse {
    detail: String,
}

/// Returns a prediction owned by the caller, consulting the cache first.
pub(crate) async fn get_prediction(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
    Path(uid): Path<String>,
) -> ApiResult<Json<PredictionResponse>> {
    let session = match state.cache.get(&uid) {
        Some(session) => session,
        None => {
            let session = state
                .store
                .session(&uid)
                .await?
                .ok_or(ApiError::NotFound("Prediction not found"))?;

            state.cache.set(session.clone());
            session
        }
    };

    if session.username.as_deref() != Some(username.as_str()) {
        return Err(ApiError::Forbidden);
    }

    Ok(Json(session.into()))
}

/// Deletes a prediction of the caller together with its image files.
pub(crate) async fn delete_prediction(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
    Path(uid): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let session = state
        .store
        .delete_session(&uid, &username)
        .await?
        .ok_or(ApiError::NotFound("Prediction not found"))?;

    state.cache.invalidate(&uid);

    for path in [session.original_image, session.predicted_image].into_iter().flatten() {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => (),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
            Err(e) => log::warn!("Failed to delete {path}: {e}"),
        }
    }

    Ok(Json(DeleteResponse {
        detail: format!("Prediction {uid} deleted successfully."),
    }))
}

/// Streams the annotated image of a prediction in a format the client accepts.
pub(crate) async fn prediction_image(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
    Path(uid): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let path = state
        .store
        .session_for_user(&uid, &username)
        .await?
        .and_then(|session| session.predicted_image)
        .filter(|path| !path.is_empty())
        .ok_or(ApiError::NotFound("Prediction not found"))?;

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ApiError::NotFound("Predicted image file not found"));
    }

    let format = negotiate(&headers).ok_or(ApiError::NotAcceptable)?;
    let bytes = tokio::fs::read(&path).await?;

    Ok(([(CONTENT_TYPE, format.media_type())], bytes).into_response())
}

fn negotiate(headers: &HeaderMap) -> Option<ImageFormat> {
    let accept = headers.get(ACCEPT).and_then(|v| v.to_str().ok()).unwrap_or_default();

    if accept.contains("image/png") {
        Some(ImageFormat::Png)
    } else if accept.contains("image/jpeg") || accept.contains("image/jpg") {
        Some(ImageFormat::Jpeg)
    } else {
        None
    }
}
