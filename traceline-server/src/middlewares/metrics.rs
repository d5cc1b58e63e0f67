use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use axum::RequestExt;

use crate::statsd::{ServerCounters, ServerTimers};

/// A middleware that records web request timings as statsd metrics.
///
/// Use this with [`axum::middleware::from_fn`].
pub async fn metrics(mut request: Request, next: Next) -> Response {
    let request_start = Instant::now();

    let matched_path = request.extract_parts::<MatchedPath>().await;
    let route = matched_path.as_ref().map_or("unknown", |m| m.as_str());
    let method = request.method().clone();

    traceline_statsd::metric!(
        counter(ServerCounters::Requests) += 1,
        route = route,
        method = method.as_str(),
    );

    let response = next.run(request).await;

    traceline_statsd::metric!(
        timer(ServerTimers::RequestsDuration) = request_start.elapsed(),
        route = route,
        method = method.as_str(),
    );
    traceline_statsd::metric!(
        counter(ServerCounters::ResponsesStatusCodes) += 1,
        status_code = response.status().as_str(),
        route = route,
        method = method.as_str(),
    );

    response
}
