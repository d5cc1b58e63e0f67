use std::env;
use std::net::SocketAddr;

use thiserror::Error;
use traceline_log::{LogConfig, LogFormat, SentryConfig};

/// The maximum accepted request body, slightly above 4 MiB.
pub const MAX_BODY_SIZE: usize = 4_500_000;

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

/// Target of the cross-service trace fan-out.
#[derive(Clone, Debug)]
pub struct WorkerTarget {
    /// Base URL of the worker service.
    pub host: String,
    /// Password for Basic auth as user `server`.
    pub password: String,
}

/// Ingestion service configuration, read from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub redis_url: String,

    /// Set on cloud deployments; presence enables rate limiting.
    pub cloud_region: Option<String>,

    /// Unset disables the trace fan-out to the worker service.
    pub worker: Option<WorkerTarget>,

    /// Statsd endpoint; unset disables metrics.
    pub statsd_addr: Option<String>,

    pub log: LogConfig,
    pub sentry: SentryConfig,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let worker = match (env::var("WORKER_HOST"), env::var("WORKER_PASSWORD")) {
            (Ok(host), Ok(password)) => Some(WorkerTarget { host, password }),
            _ => None,
        };

        let log = LogConfig {
            level: parsed("TRACELINE_LOG_LEVEL", traceline_log::Level::INFO)?,
            format: parsed("TRACELINE_LOG_FORMAT", LogFormat::Auto)?,
            ..LogConfig::default()
        };

        Ok(Self {
            listen_addr: parsed("TRACELINE_LISTEN_ADDR", ([0, 0, 0, 0], 3030).into())?,
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed("TRACELINE_DB_MAX_CONNECTIONS", 16)?,
            redis_url: required("REDIS_URL")?,
            cloud_region: env::var("TRACELINE_CLOUD_REGION").ok(),
            worker,
            statsd_addr: env::var("STATSD_ADDR").ok(),
            log,
            sentry: SentryConfig::from_env(),
        })
    }

    /// Whether this deployment enforces rate limits.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.cloud_region.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_falls_back_to_default() {
        // Relies on the variable being absent in the test environment.
        let value: u32 = parsed("TRACELINE_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
