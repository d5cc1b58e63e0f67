//! Pooled async Redis access shared by the rate limiter and the job queues.
//!
//! Traceline deployments run against a single Redis instance; the pool keeps
//! a bounded number of multiplexed connections and verifies liveness with
//! periodic `PING` checks on recycle.

mod config;
mod pool;

pub use self::config::*;
pub use self::pool::*;

// Callers build commands against the `redis` crate directly; re-export it so
// downstream crates do not need to track the version themselves.
pub use redis;

use thiserror::Error;

/// An error returned from the Redis pool or a Redis command.
#[derive(Debug, Error)]
pub enum RedisError {
    /// Failure in Redis communication.
    #[error("failed to communicate with redis")]
    Redis(#[source] redis::RedisError),

    /// Failure to check out a pooled connection.
    #[error("failed to acquire redis connection from the pool")]
    Pool(#[source] deadpool::managed::PoolError<redis::RedisError>),

    /// The configured URL could not be parsed.
    #[error("invalid redis configuration")]
    Configuration(#[source] redis::RedisError),

    /// The command did not complete within the configured deadline.
    #[error("redis command timed out")]
    Timeout,
}

/// Typical `Result` when dealing with Redis.
pub type Result<T, E = RedisError> = std::result::Result<T, E>;
