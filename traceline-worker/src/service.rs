use std::sync::Arc;

use traceline_queue::{QueueName, RedisQueue};
use traceline_redis::{RedisConfigOptions, RedisPool};
use traceline_store::Store;

use crate::config::Config;

/// Shared state of the worker service, cheap to clone.
#[derive(Clone)]
pub struct WorkerState {
    inner: Arc<StateInner>,
}

struct StateInner {
    config: Config,
    store: Store,
    redis: RedisPool,
    trace_queue: RedisQueue,
    exec_queue: RedisQueue,
}

impl WorkerState {
    /// Connects all shared resources from the configuration.
    pub async fn create(config: Config) -> anyhow::Result<Self> {
        let store = Store::connect(&config.database_url, config.db_max_connections).await?;
        let redis = RedisPool::single(&config.redis_url, RedisConfigOptions::default())?;

        let trace_queue = RedisQueue::new(redis.clone(), QueueName::TraceUpsert);
        let exec_queue = RedisQueue::new(redis.clone(), QueueName::EvaluationExecution);

        Ok(Self {
            inner: Arc::new(StateInner {
                config,
                store,
                redis,
                trace_queue,
                exec_queue,
            }),
        })
    }

    /// The service configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Database access.
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// The shared Redis pool.
    pub fn redis(&self) -> &RedisPool {
        &self.inner.redis
    }

    /// The trace-upsert queue.
    pub fn trace_queue(&self) -> &RedisQueue {
        &self.inner.trace_queue
    }

    /// The eval-execution queue.
    pub fn exec_queue(&self) -> &RedisQueue {
        &self.inner.exec_queue
    }
}
