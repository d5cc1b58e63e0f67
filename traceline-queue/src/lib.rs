//! Durable Redis-backed job queues.
//!
//! A queue is a Redis list of JSON job envelopes with at-least-once delivery:
//!
//! - [`RedisQueue::enqueue`] pushes an envelope onto the main list, or onto a
//!   delayed sorted set when the job carries a delay.
//! - Consumers pop with `LMOVE` into a per-queue processing list and register
//!   the envelope in an unacked sorted set scored by a visibility deadline.
//! - Handler success acks the envelope (removal from both); handler failure
//!   or a consumer crash leaves it for the reaper, which redelivers it with
//!   an incremented attempt counter, or routes it to the dead list once the
//!   attempt budget is spent.
//!
//! Jobs may be redelivered, so handlers must be idempotent. No ordering is
//! guaranteed between jobs.

mod consumer;
mod queue;

pub use self::consumer::*;
pub use self::queue::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of queues in the system.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum QueueName {
    /// One job per upserted trace; consumed by the eval-job creator.
    TraceUpsert,
    /// One job per evaluation execution; consumed by the eval executor.
    EvaluationExecution,
}

impl QueueName {
    /// Returns the name rendered into Redis keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TraceUpsert => "TraceUpsert",
            Self::EvaluationExecution => "EvaluationExecution",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error returned by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to communicate with Redis.
    #[error("failed to communicate with redis")]
    Redis(#[from] traceline_redis::RedisError),

    /// A job payload could not be serialized.
    #[error("failed to serialize job payload")]
    Serialize(#[source] serde_json::Error),
}
