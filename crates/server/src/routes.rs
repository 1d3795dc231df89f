mod history;
mod images;
mod predict;
mod prediction;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    handler::Handler,
    routing::{MethodRouter, get, post},
};
use http::StatusCode;
use rate_limit::{AdmissionGate, RouteClass};

use crate::{rate_limit::AdmissionLayer, state::AppState};

/// Room for multipart framing on top of the largest accepted image.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Builds the API routes.
///
/// Only `POST /predict` is admitted as an upload. Everything else, including
/// other methods on `/predict` and paths matching no route, goes through the
/// gate as a standard request.
pub(crate) fn router(state: AppState, gate: Option<Arc<AdmissionGate>>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes + MULTIPART_OVERHEAD);

    let router = match gate {
        Some(gate) => {
            let standard = AdmissionLayer::new(gate.clone(), RouteClass::Standard);
            let upload = AdmissionLayer::new(gate, RouteClass::Upload);

            let predict: MethodRouter<AppState> = post(predict::predict.layer(upload))
                .fallback(method_not_allowed.layer(standard.clone()))
                .layer(body_limit);

            api_routes()
                .layer(standard.clone())
                .route("/predict", predict)
                .fallback(not_found.layer(standard))
        }
        None => api_routes()
            .route("/predict", post(predict::predict).layer(body_limit))
            .fallback(not_found),
    };

    router.with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/prediction/{uid}",
            get(prediction::get_prediction).delete(prediction::delete_prediction),
        )
        .route("/prediction/{uid}/image", get(prediction::prediction_image))
        .route("/image/{kind}/{filename}", get(images::get_image))
        .route("/predictions/label/{label}", get(history::predictions_by_label))
        .route("/predictions/score/{min_score}", get(history::predictions_by_score))
        .route("/predictions/count", get(history::prediction_count))
        .route("/labels", get(history::recent_labels))
        .route("/stats", get(history::stats))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn method_not_allowed() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}
