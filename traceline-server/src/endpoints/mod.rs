//! Web server endpoints.

mod health;
mod ingestion;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::config::MAX_BODY_SIZE;
use crate::middlewares;
use crate::ServiceState;

/// Builds the router with all routes and middleware.
pub fn routes(state: ServiceState) -> Router {
    Router::new()
        .route(
            "/api/public/ingestion",
            post(ingestion::handle).route_layer(DefaultBodyLimit::max(MAX_BODY_SIZE)),
        )
        .route("/api/public/health", get(health::handle))
        .layer(axum::middleware::from_fn(middlewares::metrics))
        .layer(middlewares::cors())
        .with_state(state)
}
