//! Queries over the caller's recent prediction history.

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Duration, Utc};
use detector::is_supported_label;
use serde::Serialize;
use storage::{PredictionSummary, ScoredPrediction};

use crate::{
    auth::AuthenticatedUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

/// Start of the span covered by the count, label and statistics endpoints.
fn recent_cutoff() -> DateTime<Utc> {
    Utc::now() - Duration::days(7)
}

#[derive(Debug, Serialize)]
pub(crate) struct SummaryItem {
    uid: String,
    timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScoredItem {
    uid: String,
    timestamp: DateTime<Utc>,
    score: f64,
}

#[derive(Debug, Serialize)]
pub(crate) struct CountResponse {
    count: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct LabelsResponse {
    labels: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct StatsResponse {
    total_predictions: u64,
    average_confidence_score: f64,
    most_common_labels: BTreeMap<String, u64>,
}

pub(crate) async fn predictions_by_label(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
    Path(label): Path<String>,
) -> ApiResult<Json<Vec<SummaryItem>>> {
    if !is_supported_label(&label) {
        return Err(ApiError::NotFound("Label not supported"));
    }

    let rows = state.store.predictions_by_label(&username, &label).await?;

    Ok(Json(
        rows.into_iter()
            .map(|PredictionSummary { uid, timestamp }| SummaryItem { uid, timestamp })
            .collect(),
    ))
}

pub(crate) async fn predictions_by_score(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
    Path(min_score): Path<f64>,
) -> ApiResult<Json<Vec<ScoredItem>>> {
    if !(0.0..=1.0).contains(&min_score) {
        return Err(ApiError::BadRequest("Score must be between 0 and 1".to_string()));
    }

    let rows = state.store.predictions_by_score(&username, min_score).await?;

    Ok(Json(
        rows.into_iter()
            .map(|ScoredPrediction { uid, timestamp, score }| ScoredItem { uid, timestamp, score })
            .collect(),
    ))
}

pub(crate) async fn prediction_count(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
) -> ApiResult<Json<CountResponse>> {
    let count = state.store.count_sessions_since(&username, recent_cutoff()).await?;

    Ok(Json(CountResponse { count }))
}

pub(crate) async fn recent_labels(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
) -> ApiResult<Json<LabelsResponse>> {
    let labels = state.store.labels_since(&username, recent_cutoff()).await?;

    Ok(Json(LabelsResponse { labels }))
}

pub(crate) async fn stats(
    State(state): State<AppState>,
    AuthenticatedUser(username): AuthenticatedUser,
) -> ApiResult<Json<StatsResponse>> {
    let since = recent_cutoff();

    let total_predictions = state.store.count_sessions_since(&username, since).await?;
    let detections = state.store.detections_since(&username, since).await?;

    let scores: Vec<f64> = detections.iter().map(|d| d.score).collect();
    let labels = detections.into_iter().map(|d| d.label);

    Ok(Json(summarize(total_predictions, &scores, labels)))
}

fn summarize(total_predictions: u64, scores: &[f64], labels: impl Iterator<Item = String>) -> StatsResponse {
    let average_confidence_score = if scores.is_empty() {
        0.0
    } else {
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        (mean * 10_000.0).round() / 10_000.0
    };

    let mut most_common_labels = BTreeMap::new();

    for label in labels {
        *most_common_labels.entry(label).or_insert(0) += 1;
    }

    StatsResponse {
        total_predictions,
        average_confidence_score,
        most_common_labels,
    }
}
