//! Request extractors for the HTTP server.

mod auth;

pub use self::auth::*;
