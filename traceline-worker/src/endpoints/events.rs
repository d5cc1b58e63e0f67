use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::prelude::{Engine, BASE64_STANDARD};
use serde_json::json;
use traceline_event_schema::TraceUpsertJob;

use crate::statsd::WorkerCounters;
use crate::WorkerState;

/// Verifies the ingestion server's `Basic server:<password>` credentials.
fn authorized(headers: &HeaderMap, password: &str) -> bool {
    let Some(header) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };

    let Some(encoded) = header.strip_prefix("Basic ") else {
        return false;
    };

    let Ok(decoded) = BASE64_STANDARD.decode(encoded.trim()) else {
        return false;
    };

    decoded == format!("server:{password}").as_bytes()
}

/// Receives trace-upsert notifications from the ingestion server.
///
/// Each posted item becomes one durable trace-upsert job. Enqueueing is
/// idempotent downstream (job executions dedup on `(project, rule, trace)`),
/// so the server may safely re-post on its own retries.
pub async fn handle(
    State(state): State<WorkerState>,
    headers: HeaderMap,
    Json(jobs): Json<Vec<TraceUpsertJob>>,
) -> Response {
    if !authorized(&headers, &state.config().worker_password) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "invalid credentials" })),
        )
            .into_response();
    }

    let count = jobs.len();
    for job in jobs {
        if let Err(error) = state.trace_queue().enqueue(job).await {
            traceline_log::error!(
                "failed to enqueue trace upsert: {}",
                traceline_log::LogError(&error),
            );
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "failed to enqueue" })),
            )
                .into_response();
        }
    }

    traceline_statsd::metric!(counter(WorkerCounters::EventsReceived) += count as i64);
    traceline_log::debug!(count, "enqueued trace upsert jobs");

    (StatusCode::CREATED, Json(json!({ "enqueued": count }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn accepts_the_server_credentials() {
        let encoded = BASE64_STANDARD.encode("server:hunter2");
        assert!(authorized(&headers(&format!("Basic {encoded}")), "hunter2"));
    }

    #[test]
    fn rejects_wrong_password_user_or_scheme() {
        let wrong_password = BASE64_STANDARD.encode("server:wrong");
        assert!(!authorized(
            &headers(&format!("Basic {wrong_password}")),
            "hunter2"
        ));

        let wrong_user = BASE64_STANDARD.encode("admin:hunter2");
        assert!(!authorized(
            &headers(&format!("Basic {wrong_user}")),
            "hunter2"
        ));

        assert!(!authorized(&headers("Bearer token"), "hunter2"));
        assert!(!authorized(&HeaderMap::new(), "hunter2"));
    }
}
