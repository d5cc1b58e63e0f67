//! HTTP endpoints of the worker service.

mod events;
mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::WorkerState;

/// Builds the router for the worker's internal HTTP surface.
pub fn routes(state: WorkerState) -> Router {
    Router::new()
        .route("/api/events", post(events::handle))
        .route("/api/public/health", get(health::handle))
        .with_state(state)
}
