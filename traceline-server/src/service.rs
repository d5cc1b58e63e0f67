use std::sync::Arc;

use traceline_quotas::RedisRateLimiter;
use traceline_redis::{RedisConfigOptions, RedisPool};
use traceline_store::Store;

use crate::config::Config;
use crate::services::{EntityStore, TraceDispatcher, WorkerDispatcher};

/// Shared state of the ingestion service, cheap to clone.
#[derive(Clone)]
pub struct ServiceState {
    inner: Arc<StateInner>,
}

struct StateInner {
    config: Config,
    store: Store,
    entity_store: Arc<dyn EntityStore>,
    dispatcher: Arc<dyn TraceDispatcher>,
    /// `None` on self-hosted deployments, which do not rate limit.
    rate_limiter: Option<RedisRateLimiter>,
    redis: Option<RedisPool>,
}

impl ServiceState {
    /// Connects all shared resources from the configuration.
    pub async fn create(config: Config) -> anyhow::Result<Self> {
        let store = Store::connect(&config.database_url, config.db_max_connections).await?;

        let redis = if config.rate_limiting_enabled() {
            Some(RedisPool::single(
                &config.redis_url,
                RedisConfigOptions::default(),
            )?)
        } else {
            None
        };
        let rate_limiter = redis.clone().map(RedisRateLimiter::new);

        let dispatcher = WorkerDispatcher::new(config.worker.clone());

        Ok(Self {
            inner: Arc::new(StateInner {
                entity_store: Arc::new(store.clone()),
                dispatcher: Arc::new(dispatcher),
                store,
                rate_limiter,
                redis,
                config,
            }),
        })
    }

    /// The service configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Direct store access, used by authentication and health checks.
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// The entity persistence seam used by event processors.
    pub fn entity_store(&self) -> &Arc<dyn EntityStore> {
        &self.inner.entity_store
    }

    /// The trace fan-out seam.
    pub fn dispatcher(&self) -> &Arc<dyn TraceDispatcher> {
        &self.inner.dispatcher
    }

    /// The rate limiter, when this deployment enforces limits.
    pub fn rate_limiter(&self) -> Option<&RedisRateLimiter> {
        self.inner.rate_limiter.as_ref()
    }

    /// The Redis pool backing the rate limiter, when configured.
    pub fn redis(&self) -> Option<&RedisPool> {
        self.inner.redis.as_ref()
    }
}
