//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use store::Storage;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db: &'static str,
}

/// GET /health: Reports whether storage answers a round trip.
pub async fn check<S: Storage + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> (StatusCode, Json<HealthResponse>) {
    if state.order_service.is_healthy().await {
        metrics::gauge!("storage_up").set(1.0);
        (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                db: "healthy",
            }),
        )
    } else {
        metrics::gauge!("storage_up").set(0.0);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "error",
                db: "unhealthy",
            }),
        )
    }
}
