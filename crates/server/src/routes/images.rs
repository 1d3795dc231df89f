use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use http::header::CONTENT_TYPE;
use storage::ImageKind;

use crate::{
    auth::AuthenticatedUser,
    error::{ApiError, ApiResult},
    state::AppState,
    upload::{ImageFormat, sanitize_filename},
};

/// Serves an original or annotated image file owned by the caller.
pub(crate) async fn get_image(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
    Path((kind, filename)): Path<(String, String)>,
) -> ApiResult<Response> {
    let kind: ImageKind = kind
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid image type".to_string()))?;

    if sanitize_filename(&filename) != filename || filename == "." || filename == ".." {
        return Err(ApiError::NotFound("Image not found"));
    }

    let path = state.image_dir(kind).join(&filename);

    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ApiError::NotFound("Image not found"));
    }

    let stored = path.display().to_string();

    if state.store.session_by_image(kind, &stored, &username).await?.is_none() {
        return Err(ApiError::NotFound("Access denied"));
    }

    let media_type = ImageFormat::of_path(&stored)
        .map(ImageFormat::media_type)
        .unwrap_or("application/octet-stream");

    let bytes = tokio::fs::read(&path).await?;

    Ok(([(CONTENT_TYPE, media_type)], bytes).into_response())
}
