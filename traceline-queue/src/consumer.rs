use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::{Delivery, QueueError, RedisQueue};

/// The error type surfaced by job handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Processes one job delivery.
///
/// A returned error marks the attempt as failed: the job is scheduled for
/// redelivery with backoff (or the dead list, once attempts are exhausted).
/// Handlers run concurrently and must be idempotent.
#[async_trait::async_trait]
pub trait JobHandler<T>: Send + Sync + 'static {
    async fn handle(&self, delivery: &Delivery<T>) -> Result<(), HandlerError>;
}

/// Tuning knobs for one consumer pool.
#[derive(Clone, Copy, Debug)]
pub struct ConsumerConfig {
    /// Number of concurrent consumer tasks.
    pub concurrency: usize,

    /// How long a popped job stays invisible before the reaper redelivers it.
    pub visibility_timeout: Duration,

    /// Delivery attempts before a job moves to the dead list.
    pub max_attempts: u32,

    /// Sleep between polls on an empty queue.
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            visibility_timeout: Duration::from_secs(120),
            max_attempts: 5,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// A pool of consumer tasks draining one queue.
pub struct Consumer<T, H> {
    queue: RedisQueue,
    handler: Arc<H>,
    config: ConsumerConfig,
    _payload: std::marker::PhantomData<fn() -> T>,
}

impl<T, H> Consumer<T, H>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    H: JobHandler<T>,
{
    /// Creates a consumer pool for `queue` dispatching to `handler`.
    pub fn new(queue: RedisQueue, handler: H, config: ConsumerConfig) -> Self {
        Self {
            queue,
            handler: Arc::new(handler),
            config,
            _payload: std::marker::PhantomData,
        }
    }

    /// Runs the pool until `shutdown` flips to `true`.
    ///
    /// Spawns `concurrency` consumer loops plus one maintenance loop that
    /// promotes delayed jobs and redelivers expired in-flight jobs. On
    /// shutdown the loops stop popping and finish their in-flight handlers.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        let mut tasks = JoinSet::new();

        for worker in 0..self.config.concurrency.max(1) {
            let queue = self.queue.clone();
            let handler = Arc::clone(&self.handler);
            let config = self.config;
            let shutdown = shutdown.clone();

            tasks.spawn(consume_loop(queue, handler, config, shutdown));
            traceline_log::debug!(
                queue = self.queue.name().as_str(),
                worker,
                "consumer task started",
            );
        }

        tasks.spawn(maintenance_loop(
            self.queue.clone(),
            self.config,
            shutdown,
        ));

        while tasks.join_next().await.is_some() {}
    }
}

async fn consume_loop<T, H>(
    queue: RedisQueue,
    handler: Arc<H>,
    config: ConsumerConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    H: JobHandler<T>,
{
    loop {
        if *shutdown.borrow() {
            return;
        }

        let delivery = match queue.pop::<T>(config.visibility_timeout).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => {
                // Empty queue: sleep, but wake up promptly on shutdown.
                tokio::select! {
                    _ = tokio::time::sleep(config.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }
            Err(error) => {
                traceline_log::warn!(
                    queue = queue.name().as_str(),
                    "failed to pop job: {}",
                    traceline_log::LogError(&error),
                );
                tokio::time::sleep(config.poll_interval).await;
                continue;
            }
        };

        match handler.handle(&delivery).await {
            Ok(()) => {
                if let Err(error) = queue.ack(&delivery).await {
                    traceline_log::warn!(
                        queue = queue.name().as_str(),
                        job_id = %delivery.envelope.id,
                        "failed to ack job, it will be redelivered: {}",
                        traceline_log::LogError(&error),
                    );
                }
            }
            Err(error) => {
                traceline_log::warn!(
                    queue = queue.name().as_str(),
                    job_id = %delivery.envelope.id,
                    attempt = delivery.envelope.attempt,
                    "job handler failed: {error}",
                );

                let backoff = retry_backoff(delivery.envelope.attempt);
                if let Err(error) = queue.retry(&delivery, config.max_attempts, backoff).await {
                    traceline_log::error!(
                        queue = queue.name().as_str(),
                        job_id = %delivery.envelope.id,
                        "failed to schedule retry: {}",
                        traceline_log::LogError(&error),
                    );
                }
            }
        }
    }
}

async fn maintenance_loop(
    queue: RedisQueue,
    config: ConsumerConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let interval = (config.visibility_timeout / 2).max(Duration::from_secs(1));

    loop {
        if *shutdown.borrow() {
            return;
        }

        if let Err(error) = run_maintenance(&queue, config.max_attempts).await {
            traceline_log::warn!(
                queue = queue.name().as_str(),
                "queue maintenance failed: {}",
                traceline_log::LogError(&error),
            );
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {}
        }
    }
}

async fn run_maintenance(queue: &RedisQueue, max_attempts: u32) -> Result<(), QueueError> {
    queue.promote_delayed().await?;
    queue.reap_expired(max_attempts).await?;
    Ok(())
}

/// Exponential backoff for redelivery, capped at five minutes.
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt).min(300))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(retry_backoff(1), Duration::from_secs(2));
        assert_eq!(retry_backoff(2), Duration::from_secs(4));
        assert_eq!(retry_backoff(3), Duration::from_secs(8));
        assert_eq!(retry_backoff(12), Duration::from_secs(300));
        assert_eq!(retry_backoff(63), Duration::from_secs(300));
    }
}
