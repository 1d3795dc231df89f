//! Error responses of the HTTP API.

use axum::{
    Json,
    extract::multipart::MultipartError,
    response::{IntoResponse, Response},
};
use detector::DetectorError;
use http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE};
use rate_limit::QuotaError;
use serde::Serialize;
use storage::StoreError;

pub(crate) type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid credentials")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("{0}")]
    NotFound(&'static str),

    #[error("Client does not accept an image format")]
    NotAcceptable,

    #[error("File too large (max {max_mb}MB)")]
    PayloadTooLarge { max_mb: usize },

    #[error("{0}")]
    UnsupportedMediaType(&'static str),

    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error("Detection failed")]
    Detector(#[from] DetectorError),

    #[error("Internal server error")]
    Store(#[from] StoreError),

    #[error("Internal server error")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Quota(QuotaError::Store(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Quota(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Detector(_) => StatusCode::BAD_GATEWAY,
            ApiError::Store(_) | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps a failed multipart read, keeping the body limit rejection distinct.
    pub(crate) fn from_multipart(error: MultipartError, max_bytes: usize) -> Self {
        if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::too_large(max_bytes)
        } else {
            ApiError::BadRequest(error.body_text())
        }
    }

    pub(crate) fn too_large(max_bytes: usize) -> Self {
        ApiError::PayloadTooLarge {
            max_mb: max_bytes / (1024 * 1024),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            ApiError::Quota(QuotaError::Store(e)) | ApiError::Store(e) => {
                log::error!("Prediction store failed: {e}");
            }
            ApiError::Io(e) => log::error!("Upload storage failed: {e}"),
            ApiError::Detector(e) => log::error!("{e}"),
            _ => log::debug!("Request failed with {status}: {self}"),
        }

        let body = ErrorBody {
            detail: self.to_string(),
        };

        let mut response = (status, Json(body)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
        }

        response
    }
}
