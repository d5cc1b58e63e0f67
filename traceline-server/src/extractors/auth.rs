use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::services::{verify_api_key, AuthError, AuthedRequest};
use crate::ServiceState;

/// Extracts and verifies the caller's API key.
///
/// Rejects with a 401 carrying the failure reason. Rate limiting is a
/// separate step, invoked by the handler with the route's resource; an
/// invalid key never consumes budget.
pub struct Authenticated(pub AuthedRequest);

#[axum::async_trait]
impl FromRequestParts<ServiceState> for Authenticated {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        match verify_api_key(state.store(), header).await {
            Ok(authed) => Ok(Self(authed)),
            Err(AuthError::Internal(error)) => {
                traceline_log::error!(
                    "authentication lookup failed: {}",
                    traceline_log::LogError(&error),
                );
                Err((
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "internal server error" })),
                )
                    .into_response())
            }
            Err(error) => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": error.to_string() })),
            )
                .into_response()),
        }
    }
}
