use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use traceline_event_schema::RateLimitResource;
use traceline_quotas::RateLimitCheck;

use crate::services::AuthedRequest;
use crate::statsd::ServerCounters;
use crate::ServiceState;

const X_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Checks the caller's budget for `resource` and rejects exhausted callers.
///
/// Self-hosted deployments carry no rate limiter and admit everything. A
/// Redis failure during the check fails closed with a 500: answering 429
/// would misreport the limit state to the SDK's backoff logic.
pub async fn enforce_rate_limit(
    state: &ServiceState,
    authed: &AuthedRequest,
    resource: RateLimitResource,
) -> Result<(), Response> {
    let Some(limiter) = state.rate_limiter() else {
        return Ok(());
    };

    let check = match limiter.check(&authed.api_key, resource).await {
        Ok(Some(check)) => check,
        Ok(None) => return Ok(()),
        Err(error) => {
            traceline_log::error!(
                resource = resource.name(),
                "rate limit check failed: {}",
                traceline_log::LogError(&error),
            );
            return Err(
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response(),
            );
        }
    };

    if !check.is_exceeded() {
        return Ok(());
    }

    traceline_statsd::metric!(
        counter(ServerCounters::RateLimitExceeded) += 1,
        org_id = authed.api_key.org_id.as_str(),
        plan = authed.api_key.plan.name(),
        resource = resource.name(),
    );

    Err(rate_limit_response(&check))
}

/// Builds the 429 response with the standard rate-limit headers.
fn rate_limit_response(check: &RateLimitCheck) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "message": "Too Many Requests" })),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::RETRY_AFTER, check.retry_after_seconds().into());
    headers.insert(X_RATE_LIMIT_LIMIT, check.limit.into());
    headers.insert(X_RATE_LIMIT_REMAINING, check.remaining.into());
    headers.insert(X_RATE_LIMIT_RESET, check.reset_at.into());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_carries_the_standard_headers() {
        let check = RateLimitCheck {
            resource: RateLimitResource::Ingestion,
            limit: 100,
            consumed: 101,
            remaining: 0,
            reset_at: 1_700_000_040,
            ms_before_next: 17_500,
            is_first_in_duration: false,
        };

        let response = rate_limit_response(&check);
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let headers = response.headers();
        assert_eq!(headers[header::RETRY_AFTER], "18");
        assert_eq!(headers["x-ratelimit-limit"], "100");
        assert_eq!(headers["x-ratelimit-remaining"], "0");
        assert_eq!(headers["x-ratelimit-reset"], "1700000040");
    }
}
