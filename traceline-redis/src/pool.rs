use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use deadpool::managed::{self, Manager, Metrics, Object, Pool, RecycleResult};
use redis::aio::MultiplexedConnection;
use redis::{Client, Cmd, Pipeline, RedisFuture, Value};

use crate::{RedisConfigOptions, RedisError};

/// Counts invocations and reports when the check interval is reached.
///
/// Used to avoid running a `PING` on every connection recycle.
struct IntervalCounter {
    value: AtomicUsize,
    max_value: usize,
}

impl IntervalCounter {
    fn new(max_value: usize) -> Self {
        Self {
            value: AtomicUsize::new(0),
            max_value: max_value.max(1),
        }
    }

    fn is_reached(&self) -> bool {
        let value = self.value.load(Ordering::Relaxed);
        self.value
            .store((value + 1) % self.max_value, Ordering::Relaxed);
        value == 0
    }
}

/// Manages connections to a single Redis instance.
pub struct SingleManager {
    client: Client,
    ping_number: AtomicUsize,
    interval_counter: IntervalCounter,
}

impl SingleManager {
    fn new(url: &str, recycle_check_frequency: usize) -> Result<Self, RedisError> {
        Ok(Self {
            client: Client::open(url).map_err(RedisError::Configuration)?,
            ping_number: AtomicUsize::new(0),
            interval_counter: IntervalCounter::new(recycle_check_frequency),
        })
    }
}

impl Manager for SingleManager {
    type Type = MultiplexedConnection;
    type Error = redis::RedisError;

    async fn create(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }

    async fn recycle(
        &self,
        conn: &mut MultiplexedConnection,
        _: &Metrics,
    ) -> RecycleResult<redis::RedisError> {
        // Most recycles optimistically assume the connection is alive; only
        // every nth check pays for a roundtrip.
        if !self.interval_counter.is_reached() {
            return Ok(());
        }

        let ping_number = self.ping_number.fetch_add(1, Ordering::Relaxed).to_string();
        let response = redis::cmd("PING")
            .arg(&ping_number)
            .query_async::<String>(conn)
            .await?;

        if response == ping_number {
            Ok(())
        } else {
            Err(managed::RecycleError::message("invalid PING response"))
        }
    }
}

/// A checked-out pooled connection.
///
/// Implements [`redis::aio::ConnectionLike`], so it can be passed to any
/// `query_async` call directly.
pub struct RedisConnection(Object<SingleManager>);

impl redis::aio::ConnectionLike for RedisConnection {
    fn req_packed_command<'a>(&'a mut self, cmd: &'a Cmd) -> RedisFuture<'a, Value> {
        self.0.req_packed_command(cmd)
    }

    fn req_packed_commands<'a>(
        &'a mut self,
        cmd: &'a Pipeline,
        offset: usize,
        count: usize,
    ) -> RedisFuture<'a, Vec<Value>> {
        self.0.req_packed_commands(cmd, offset, count)
    }

    fn get_db(&self) -> i64 {
        self.0.get_db()
    }
}

/// A connection pool for a single Redis instance.
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool<SingleManager>,
    query_timeout: Duration,
}

impl RedisPool {
    /// Creates a pool for the Redis instance at `url`.
    pub fn single(url: &str, opts: RedisConfigOptions) -> Result<Self, RedisError> {
        let manager = SingleManager::new(url, opts.recycle_check_frequency)?;

        let pool = Pool::builder(manager)
            .max_size(opts.max_connections as usize)
            .wait_timeout(Some(Duration::from_secs(opts.connection_timeout)))
            .create_timeout(Some(Duration::from_secs(opts.connection_timeout)))
            .runtime(deadpool::Runtime::Tokio1)
            .build()
            .expect("deadpool builder with runtime cannot fail");

        Ok(Self {
            pool,
            query_timeout: Duration::from_secs(opts.query_timeout),
        })
    }

    /// Checks out a connection from the pool.
    pub async fn get(&self) -> Result<RedisConnection, RedisError> {
        match self.pool.get().await {
            Ok(object) => Ok(RedisConnection(object)),
            Err(error) => Err(RedisError::Pool(error)),
        }
    }

    /// Runs a single command against a pooled connection under the query
    /// deadline.
    pub async fn query<T: redis::FromRedisValue>(&self, cmd: &Cmd) -> Result<T, RedisError> {
        let mut conn = self.get().await?;

        match tokio::time::timeout(self.query_timeout, cmd.query_async(&mut conn)).await {
            Ok(result) => result.map_err(RedisError::Redis),
            Err(_) => Err(RedisError::Timeout),
        }
    }

    /// Runs a pipeline against a pooled connection under the query deadline.
    pub async fn query_pipeline<T: redis::FromRedisValue>(
        &self,
        pipeline: &Pipeline,
    ) -> Result<T, RedisError> {
        let mut conn = self.get().await?;

        match tokio::time::timeout(self.query_timeout, pipeline.query_async(&mut conn)).await {
            Ok(result) => result.map_err(RedisError::Redis),
            Err(_) => Err(RedisError::Timeout),
        }
    }

    /// Issues a `PING`, for health checks.
    pub async fn ping(&self) -> Result<(), RedisError> {
        let _: String = self.query(&redis::cmd("PING")).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPool")
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}
