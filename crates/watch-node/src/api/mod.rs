pub mod routes;

use crate::storage::DataDirs;
use axum::http::{header, HeaderValue};
use axum::{routing::get, Router};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub dirs: DataDirs,
}

impl AppState {
    pub fn new(dirs: DataDirs) -> Self {
        Self { dirs }
    }
}

/// Status, photo and operational endpoints
///
/// Every response tells browsers not to cache: the UI polls the same
/// `status/latest.*` URLs for new content.
pub fn router(state: AppState) -> Router {
    // Request paths map onto the data root as they are, so
    // `/photos/camera-1.jpg` is `<root>/photos/camera-1.jpg`
    let files = ServeDir::new(state.dirs.root());

    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/metrics", get(routes::metrics))
        .route("/photos", get(routes::list_photos))
        .route_service("/photos/*path", files.clone())
        .route_service("/status/*path", files)
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
