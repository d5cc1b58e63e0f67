use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use traceline_redis::RedisPool;
use uuid::Uuid;

use crate::{QueueError, QueueName};

/// The wire format of one queued job.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct JobEnvelope<T> {
    /// Unique id of this envelope, assigned at enqueue time.
    pub id: Uuid,

    /// The job payload.
    pub payload: T,

    /// When the job was first enqueued. Redeliveries keep the original
    /// timestamp, so queue wait time measures end-to-end latency.
    pub enqueued_at: DateTime<Utc>,

    /// Delivery attempt, starting at 1.
    pub attempt: u32,
}

/// A job popped from the queue, awaiting ack or retry.
///
/// Keeps the raw JSON around: removal from the processing structures must
/// match the exact bytes that were pushed.
#[derive(Debug)]
pub struct Delivery<T> {
    pub envelope: JobEnvelope<T>,
    pub(crate) raw: String,
}

/// One durable queue over Redis.
#[derive(Clone, Debug)]
pub struct RedisQueue {
    pool: RedisPool,
    name: QueueName,
}

impl RedisQueue {
    /// Creates a handle to the queue `name`.
    pub fn new(pool: RedisPool, name: QueueName) -> Self {
        Self { pool, name }
    }

    /// Returns the queue name.
    pub fn name(&self) -> QueueName {
        self.name
    }

    fn main_key(&self) -> String {
        format!("queue:{}", self.name)
    }

    fn processing_key(&self) -> String {
        format!("queue:{}:processing", self.name)
    }

    fn unacked_key(&self) -> String {
        format!("queue:{}:unacked", self.name)
    }

    fn delayed_key(&self) -> String {
        format!("queue:{}:delayed", self.name)
    }

    fn dead_key(&self) -> String {
        format!("queue:{}:dead", self.name)
    }

    /// Enqueues a job for immediate delivery.
    pub async fn enqueue<T: Serialize>(&self, payload: T) -> Result<Uuid, QueueError> {
        self.enqueue_in(payload, Duration::ZERO).await
    }

    /// Enqueues a job that becomes visible after `delay`.
    pub async fn enqueue_in<T: Serialize>(
        &self,
        payload: T,
        delay: Duration,
    ) -> Result<Uuid, QueueError> {
        let envelope = JobEnvelope {
            id: Uuid::new_v4(),
            payload,
            enqueued_at: Utc::now(),
            attempt: 1,
        };
        let raw = serde_json::to_string(&envelope).map_err(QueueError::Serialize)?;

        if delay.is_zero() {
            let cmd = redis::cmd("LPUSH").arg(self.main_key()).arg(&raw).to_owned();
            let _: i64 = self.pool.query(&cmd).await?;
        } else {
            let ready_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
            let cmd = redis::cmd("ZADD")
                .arg(self.delayed_key())
                .arg(ready_at)
                .arg(&raw)
                .to_owned();
            let _: i64 = self.pool.query(&cmd).await?;
        }

        Ok(envelope.id)
    }

    /// Number of jobs waiting for delivery.
    pub async fn len(&self) -> Result<u64, QueueError> {
        let cmd = redis::cmd("LLEN").arg(self.main_key()).to_owned();
        Ok(self.pool.query(&cmd).await?)
    }

    /// Whether the queue currently has no deliverable jobs.
    pub async fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len().await? == 0)
    }

    /// Pops one job, registering it as in-flight until `visibility` elapses.
    ///
    /// Returns `None` when the queue is empty. An envelope that fails to
    /// deserialize is routed straight to the dead list.
    pub async fn pop<T: DeserializeOwned>(
        &self,
        visibility: Duration,
    ) -> Result<Option<Delivery<T>>, QueueError> {
        let cmd = redis::cmd("LMOVE")
            .arg(self.main_key())
            .arg(self.processing_key())
            .arg("RIGHT")
            .arg("LEFT")
            .to_owned();
        let raw: Option<String> = self.pool.query(&cmd).await?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let deadline = Utc::now().timestamp_millis() + visibility.as_millis() as i64;
        let cmd = redis::cmd("ZADD")
            .arg(self.unacked_key())
            .arg(deadline)
            .arg(&raw)
            .to_owned();
        let _: i64 = self.pool.query(&cmd).await?;

        match serde_json::from_str(&raw) {
            Ok(envelope) => Ok(Some(Delivery { envelope, raw })),
            Err(error) => {
                traceline_log::error!(
                    queue = self.name.as_str(),
                    "dropping undecodable job envelope to dead list: {error}",
                );
                self.bury(&raw).await?;
                Ok(None)
            }
        }
    }

    /// Acknowledges a delivery, removing it from the queue for good.
    pub async fn ack<T>(&self, delivery: &Delivery<T>) -> Result<(), QueueError> {
        self.forget(&delivery.raw).await
    }

    /// Schedules a failed delivery for redelivery after `backoff`.
    ///
    /// Once the envelope has exhausted `max_attempts`, it is moved to the
    /// dead list instead.
    pub async fn retry<T: Serialize>(
        &self,
        delivery: &Delivery<T>,
        max_attempts: u32,
        backoff: Duration,
    ) -> Result<(), QueueError> {
        self.forget(&delivery.raw).await?;

        if delivery.envelope.attempt >= max_attempts {
            traceline_log::warn!(
                queue = self.name.as_str(),
                job_id = %delivery.envelope.id,
                attempts = delivery.envelope.attempt,
                "job exhausted its attempts, moving to dead list",
            );
            return self.bury(&delivery.raw).await;
        }

        let redelivery = JobEnvelope {
            id: delivery.envelope.id,
            payload: &delivery.envelope.payload,
            enqueued_at: delivery.envelope.enqueued_at,
            attempt: delivery.envelope.attempt + 1,
        };
        let raw = serde_json::to_string(&redelivery).map_err(QueueError::Serialize)?;

        let ready_at = Utc::now().timestamp_millis() + backoff.as_millis() as i64;
        let cmd = redis::cmd("ZADD")
            .arg(self.delayed_key())
            .arg(ready_at)
            .arg(&raw)
            .to_owned();
        let _: i64 = self.pool.query(&cmd).await?;

        Ok(())
    }

    /// Removes an envelope from the processing list and unacked set.
    async fn forget(&self, raw: &str) -> Result<(), QueueError> {
        let mut pipeline = redis::pipe();
        pipeline
            .cmd("LREM")
            .arg(self.processing_key())
            .arg(1)
            .arg(raw)
            .ignore()
            .cmd("ZREM")
            .arg(self.unacked_key())
            .arg(raw)
            .ignore();
        let _: () = self.pool.query_pipeline(&pipeline).await?;
        Ok(())
    }

    async fn bury(&self, raw: &str) -> Result<(), QueueError> {
        let mut pipeline = redis::pipe();
        pipeline
            .cmd("LREM")
            .arg(self.processing_key())
            .arg(1)
            .arg(raw)
            .ignore()
            .cmd("ZREM")
            .arg(self.unacked_key())
            .arg(raw)
            .ignore()
            .cmd("LPUSH")
            .arg(self.dead_key())
            .arg(raw)
            .ignore();
        let _: () = self.pool.query_pipeline(&pipeline).await?;
        Ok(())
    }

    /// Moves delayed jobs whose time has come onto the main list.
    ///
    /// Returns the number of promoted jobs.
    pub async fn promote_delayed(&self) -> Result<usize, QueueError> {
        let now = Utc::now().timestamp_millis();
        let cmd = redis::cmd("ZRANGEBYSCORE")
            .arg(self.delayed_key())
            .arg("-inf")
            .arg(now)
            .arg("LIMIT")
            .arg(0)
            .arg(128)
            .to_owned();
        let due: Vec<String> = self.pool.query(&cmd).await?;

        for raw in &due {
            let mut pipeline = redis::pipe();
            pipeline
                .cmd("ZREM")
                .arg(self.delayed_key())
                .arg(raw)
                .ignore()
                .cmd("LPUSH")
                .arg(self.main_key())
                .arg(raw)
                .ignore();
            let _: () = self.pool.query_pipeline(&pipeline).await?;
        }

        Ok(due.len())
    }

    /// Redelivers in-flight jobs whose visibility deadline has passed.
    ///
    /// This covers consumers that crashed mid-job: the envelope goes back to
    /// the main list with an incremented attempt, or to the dead list when
    /// its attempts are spent.
    pub async fn reap_expired(&self, max_attempts: u32) -> Result<usize, QueueError> {
        let now = Utc::now().timestamp_millis();
        let cmd = redis::cmd("ZRANGEBYSCORE")
            .arg(self.unacked_key())
            .arg("-inf")
            .arg(now)
            .arg("LIMIT")
            .arg(0)
            .arg(128)
            .to_owned();
        let expired: Vec<String> = self.pool.query(&cmd).await?;

        let mut redelivered = 0;
        for raw in &expired {
            match serde_json::from_str::<JobEnvelope<serde_json::Value>>(raw) {
                Ok(envelope) if envelope.attempt < max_attempts => {
                    let redelivery = JobEnvelope {
                        attempt: envelope.attempt + 1,
                        ..envelope
                    };
                    let requeued =
                        serde_json::to_string(&redelivery).map_err(QueueError::Serialize)?;

                    self.forget(raw).await?;
                    let cmd = redis::cmd("LPUSH")
                        .arg(self.main_key())
                        .arg(&requeued)
                        .to_owned();
                    let _: i64 = self.pool.query(&cmd).await?;
                    redelivered += 1;

                    traceline_log::warn!(
                        queue = self.name.as_str(),
                        job_id = %redelivery.id,
                        attempt = redelivery.attempt,
                        "redelivering job after visibility timeout",
                    );
                }
                _ => self.bury(raw).await?,
            }
        }

        Ok(redelivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_and_counts_attempts() {
        let envelope = JobEnvelope {
            id: Uuid::new_v4(),
            payload: serde_json::json!({ "traceId": "t-1", "projectId": "p-1" }),
            enqueued_at: Utc::now(),
            attempt: 1,
        };

        let raw = serde_json::to_string(&envelope).unwrap();
        let parsed: JobEnvelope<serde_json::Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.id, envelope.id);
        assert_eq!(parsed.attempt, 1);

        let redelivery = JobEnvelope {
            attempt: parsed.attempt + 1,
            ..parsed
        };
        assert_eq!(redelivery.attempt, 2);
        assert_eq!(redelivery.enqueued_at, envelope.enqueued_at);
    }

    #[test]
    fn queue_keys_embed_the_queue_name() {
        use traceline_redis::{RedisConfigOptions, RedisPool};

        let pool = RedisPool::single("redis://127.0.0.1:6379", RedisConfigOptions::default())
            .expect("pool construction is offline");
        let queue = RedisQueue::new(pool, QueueName::TraceUpsert);

        assert_eq!(queue.main_key(), "queue:TraceUpsert");
        assert_eq!(queue.processing_key(), "queue:TraceUpsert:processing");
        assert_eq!(queue.unacked_key(), "queue:TraceUpsert:unacked");
        assert_eq!(queue.delayed_key(), "queue:TraceUpsert:delayed");
        assert_eq!(queue.dead_key(), "queue:TraceUpsert:dead");
    }
}
