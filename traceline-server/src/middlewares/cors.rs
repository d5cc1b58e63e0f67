use std::time::Duration;

use axum::http::{HeaderName, Method};
use tower_http::cors::CorsLayer;

/// Creates a preconfigured CORS middleware for the public ingestion API.
///
/// Allows POST from any origin with the standard SDK headers, and exposes
/// the rate-limit headers so browser SDKs can back off.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods(Method::POST)
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
            HeaderName::from_static("accept"),
            HeaderName::from_static("origin"),
            HeaderName::from_static("referer"),
            HeaderName::from_static("x-requested-with"),
            HeaderName::from_static("x-traceline-sdk-name"),
            HeaderName::from_static("x-traceline-sdk-version"),
        ])
        .allow_origin(tower_http::cors::Any)
        .expose_headers([
            HeaderName::from_static("retry-after"),
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-ratelimit-reset"),
        ])
        .max_age(Duration::from_secs(3600))
}
