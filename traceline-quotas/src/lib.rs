//! Per-organization request admission backed by Redis.
//!
//! Every rate-limited resource has a budget of `points` requests per
//! `duration` seconds. The effective budget for a request resolves as
//! organization override > plan group config > unlimited. Admission uses a
//! fixed window: one atomic counter per `(resource, organization, window
//! slot)` key, incremented on every check.
//!
//! Budget exhaustion is a normal return value, not an error; callers decide
//! the response policy. Redis failures propagate so callers can fail closed.

mod config;
mod redis;

pub use self::config::*;
pub use self::redis::*;

use thiserror::Error;
use traceline_event_schema::Plan;

/// An error returned by the rate limiter.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The organization's plan is not mapped to any plan group.
    #[error("no rate limit configuration for plan {0}")]
    UnknownPlan(Plan),

    /// Failed to communicate with Redis.
    #[error("failed to communicate with redis")]
    Redis(#[from] traceline_redis::RedisError),
}
