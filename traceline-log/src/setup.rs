use std::borrow::Cow;
use std::env;

use sentry::types::Dsn;
use serde::{Deserialize, Serialize};
use tracing::{level_filters::LevelFilter, Level};
use tracing_subscriber::{prelude::*, EnvFilter, Layer};

/// Controls the log format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    #[default]
    Auto,

    /// Pretty printing with colors.
    Pretty,

    /// Simplified plain text output.
    Simplified,

    /// Dump out JSON lines.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "auto" => Ok(Self::Auto),
            "pretty" => Ok(Self::Pretty),
            "simplified" => Ok(Self::Simplified),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Controls the logging system.
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// The log level for all Traceline crates.
    pub level: Level,

    /// Controls the log output format.
    pub format: LogFormat,

    /// When set to `true`, backtraces are forced on.
    pub enable_backtraces: bool,

    /// Sets the trace sample rate for performance monitoring.
    pub traces_sample_rate: f32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Auto,
            enable_backtraces: false,
            traces_sample_rate: 0.0,
        }
    }
}

/// Controls internal reporting to Sentry.
#[derive(Clone, Debug, Default)]
pub struct SentryConfig {
    /// The DSN specifying the project to report to.
    ///
    /// Reporting is disabled when unset.
    pub dsn: Option<Dsn>,

    /// Sets the environment for this service.
    pub environment: Option<Cow<'static, str>>,
}

impl SentryConfig {
    /// Creates a config from the conventional `SENTRY_DSN` variable.
    pub fn from_env() -> Self {
        let dsn = env::var("SENTRY_DSN")
            .ok()
            .and_then(|raw| raw.parse().ok());

        Self {
            dsn,
            environment: env::var("SENTRY_ENVIRONMENT").ok().map(Cow::Owned),
        }
    }
}

/// Configures the default log level for all crates in the workspace.
fn default_filters(level: Level) -> EnvFilter {
    // Noisy dependencies are clamped to WARN regardless of our own level.
    let mut filter = EnvFilter::new(format!(
        "{level},sqlx=WARN,hyper=WARN,reqwest=WARN,tower_http=WARN"
    ));

    for name in ["traceline", "traceline_server", "traceline_worker"] {
        if let Ok(directive) = format!("{name}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    filter
}

/// Initialize the logging system and reporting to Sentry.
///
/// This must be called exactly once, before the service starts handling
/// traffic. The Sentry client guard is intentionally leaked so that reporting
/// stays alive for the lifetime of the process; events are flushed on drop of
/// the runtime.
pub fn init(config: &LogConfig, sentry: &SentryConfig) {
    if config.enable_backtraces {
        env::set_var("RUST_BACKTRACE", "full");
    }

    let subscriber = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    let format = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) | (LogFormat::Pretty, _) => {
            subscriber.compact().without_time().boxed()
        }
        (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
            subscriber.with_ansi(false).boxed()
        }
        (LogFormat::Json, _) => subscriber
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(format.with_filter(LevelFilter::from(config.level)))
        .with(sentry::integrations::tracing::layer())
        .with(match env::var(EnvFilter::DEFAULT_ENV) {
            Ok(value) => EnvFilter::new(value),
            Err(_) => default_filters(config.level),
        })
        .init();

    if let Some(dsn) = sentry.dsn.clone() {
        let guard = sentry::init(sentry::ClientOptions {
            dsn: Some(dsn),
            in_app_include: vec!["traceline"],
            release: sentry::release_name!(),
            attach_stacktrace: config.enable_backtraces,
            environment: sentry.environment.clone(),
            traces_sample_rate: config.traces_sample_rate,
            ..Default::default()
        });

        // Keep the client initialized for the process lifetime.
        std::mem::forget(guard);
    }
}

/// Reports an error to Sentry, if reporting is configured.
///
/// Hot paths must classify errors before calling this: expected failures
/// (rate-limit exhaustion, user input errors, known provider errors) are
/// logged but never captured, to keep the alert stream meaningful.
pub fn capture_error<E>(error: &E)
where
    E: std::error::Error + ?Sized,
{
    if sentry::Hub::main().client().is_some() {
        sentry::capture_error(error);
    }
}
