use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::WorkerState;

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    database: bool,
    redis: bool,
}

/// Liveness and dependency probe.
pub async fn handle(State(state): State<WorkerState>) -> impl IntoResponse {
    let database = state.store().ping().await.is_ok();
    let redis = state.redis().ping().await.is_ok();

    let healthy = database && redis;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthStatus {
            status: if healthy { "ok" } else { "unavailable" },
            database,
            redis,
        }),
    )
}
