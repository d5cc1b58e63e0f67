use std::env;
use std::net::SocketAddr;

use thiserror::Error;
use traceline_log::{LogConfig, LogFormat, SentryConfig};

/// An error while reading the environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value in environment variable {name}: {message}")]
    Invalid {
        name: &'static str,
        message: String,
    },
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.parse().map_err(|error: T::Err| ConfigError::Invalid {
            name,
            message: error.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Worker service configuration, read from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub redis_url: String,

    /// Password the ingestion server authenticates with on `/api/events`.
    pub worker_password: String,

    /// Pool size of the eval-job creator.
    pub creator_concurrency: usize,

    /// Pool size of the eval executor.
    pub executor_concurrency: usize,

    /// Statsd endpoint; unset disables metrics.
    pub statsd_addr: Option<String>,

    pub log: LogConfig,
    pub sentry: SentryConfig,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let log = LogConfig {
            level: parsed("TRACELINE_LOG_LEVEL", traceline_log::Level::INFO)?,
            format: parsed("TRACELINE_LOG_FORMAT", LogFormat::Auto)?,
            ..LogConfig::default()
        };

        Ok(Self {
            listen_addr: parsed("TRACELINE_WORKER_LISTEN_ADDR", ([0, 0, 0, 0], 3031).into())?,
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed("TRACELINE_DB_MAX_CONNECTIONS", 16)?,
            redis_url: required("REDIS_URL")?,
            worker_password: required("WORKER_PASSWORD")?,
            creator_concurrency: parsed("TRACELINE_EVAL_CREATOR_WORKER_CONCURRENCY", 2)?,
            executor_concurrency: parsed("TRACELINE_EVAL_EXECUTION_WORKER_CONCURRENCY", 4)?,
            statsd_addr: env::var("STATSD_ADDR").ok(),
            log,
            sentry: SentryConfig::from_env(),
        })
    }
}
