use serde::{Deserialize, Serialize};

fn default_max_connections() -> u32 {
    24
}

fn default_connection_timeout() -> u64 {
    5
}

fn default_query_timeout() -> u64 {
    5
}

fn default_recycle_check_frequency() -> usize {
    100
}

/// Additional configuration options for a redis client.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(default)]
pub struct RedisConfigOptions {
    /// Maximum number of connections managed by the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Sets the connection timeout used by the pool, in seconds.
    ///
    /// Calls to `get` wait at most this long before giving up on a
    /// connection.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Sets a deadline for individual Redis commands, in seconds.
    ///
    /// The rate limiter relies on this bound: a stalled Redis must surface as
    /// an error rather than stalling request handling.
    #[serde(default = "default_query_timeout")]
    pub query_timeout: u64,

    /// Every nth connection recycle runs an actual `PING` health check.
    #[serde(default = "default_recycle_check_frequency")]
    pub recycle_check_frequency: usize,
}

impl Default for RedisConfigOptions {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connection_timeout: default_connection_timeout(),
            query_timeout: default_query_timeout(),
            recycle_check_frequency: default_recycle_check_frequency(),
        }
    }
}
