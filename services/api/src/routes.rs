use crate::infra::AppState;
use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use chrono::Local;
use listing_ingest::error::AppError;
use listing_ingest::workflows::listings::IngestionReport;
use serde_json::json;
use std::io::Cursor;

/// Listing exports run to tens of megabytes.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

pub(crate) fn ingest_routes() -> axum::Router {
    axum::Router::new()
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/ingest",
            axum::routing::post(ingest_endpoint).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Runs the request body through the pipeline. Row-level problems come back in the report
/// with 200; only an unreadable file is a 400.
pub(crate) async fn ingest_endpoint(
    Extension(state): Extension<AppState>,
    body: Bytes,
) -> Result<Json<IngestionReport>, AppError> {
    let today = Local::now().date_naive();
    let report = state
        .coordinator
        .run_reader(Cursor::new(body), today)
        .await?;
    Ok(Json(report))
}
