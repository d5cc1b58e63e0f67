//! Middlewares for the HTTP server.
//!
//! Tower layers and `axum::middleware::from_fn` functions registered on the
//! router in [`endpoints::routes`](crate::endpoints::routes).

mod cors;
mod metrics;

pub use self::cors::*;
pub use self::metrics::*;
