use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::ServiceState;

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    database: bool,
    redis: Option<bool>,
}

/// Liveness and dependency probe.
///
/// Reports 503 when the database, or a configured Redis, is unreachable.
pub async fn handle(State(state): State<ServiceState>) -> impl IntoResponse {
    let database = state.store().ping().await.is_ok();

    let redis = match state.redis() {
        Some(pool) => Some(pool.ping().await.is_ok()),
        None => None,
    };

    let healthy = database && redis.unwrap_or(true);
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
