use super::AppState;
use crate::storage::DEFAULT_PHOTO_LIMIT;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "watch-node"
        })),
    )
}

pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PhotoQuery {
    pub limit: Option<usize>,
}

/// Recent photos, newest first
pub async fn list_photos(State(state): State<AppState>, Query(query): Query<PhotoQuery>) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_PHOTO_LIMIT).min(DEFAULT_PHOTO_LIMIT);
    let dirs = state.dirs.clone();

    match tokio::task::spawn_blocking(move || dirs.list_photos(limit)).await {
        Ok(Ok(photos)) => (StatusCode::OK, Json(photos)).into_response(),
        Ok(Err(e)) => {
            tracing::error!("Failed to list photos: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "failed to list photos" })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Photo listing task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
