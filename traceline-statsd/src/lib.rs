//! A high-level statsd metric client built on cadence.
//!
//! ## Defining metrics
//!
//! Metric names are type safe: define an enum per metric kind and implement
//! the matching trait ([`CounterMetric`], [`HistogramMetric`], [`GaugeMetric`]
//! or [`TimerMetric`]) on it. Each service keeps its metric enums in a
//! `statsd` module next to the code that emits them.
//!
//! ## Initializing the client
//!
//! Metrics can be used without initializing a statsd client; in that case all
//! recording is a noop. Call [`init`] once at startup to start shipping
//! metrics over UDP.
//!
//! ## Macro usage
//!
//! The recommended way to record metrics is the [`metric!`] macro:
//!
//! ```
//! use traceline_statsd::{metric, CounterMetric};
//!
//! struct BatchReceived;
//!
//! impl CounterMetric for BatchReceived {
//!     fn name(&self) -> &'static str {
//!         "ingestion.batch_received"
//!     }
//! }
//!
//! metric!(counter(BatchReceived) += 1, resource = "ingestion");
//! ```

use std::collections::BTreeMap;
use std::net::UdpSocket;
use std::sync::Arc;

use cadence::{
    BufferedUdpMetricSink, Metric, MetricBuilder, QueuingMetricSink, SpyMetricSink, StatsdClient,
};
use parking_lot::{Mutex, RwLock};

// The `metric!` macro expands in downstream crates and needs the cadence
// builder traits in scope there.
#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;
}

static METRICS_CLIENT: RwLock<Option<Arc<MetricsClient>>> = RwLock::new(None);

/// The globally configured statsd client.
pub struct MetricsClient {
    /// The raw cadence client.
    pub statsd_client: StatsdClient,

    /// Tags appended to every metric.
    pub default_tags: BTreeMap<String, String>,
}

impl MetricsClient {
    /// Sends the given metric, attaching the default tags.
    ///
    /// Send failures are logged at debug level and otherwise dropped; metrics
    /// must never take down the caller.
    pub fn send_metric<'a, T>(&'a self, mut metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        for (key, value) in &self.default_tags {
            metric = metric.with_tag(key, value);
        }

        if let Err(error) = metric.try_send() {
            traceline_log::debug!("failed to send metric: {error}");
        }
    }
}

impl std::fmt::Debug for MetricsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsClient")
            .field("default_tags", &self.default_tags)
            .finish_non_exhaustive()
    }
}

/// Replaces the global client, returning the previous one.
fn set_client(client: Option<Arc<MetricsClient>>) -> Option<Arc<MetricsClient>> {
    std::mem::replace(&mut METRICS_CLIENT.write(), client)
}

/// Initializes the global statsd client shipping to `host` over UDP.
///
/// `prefix` is prepended to all metric names. Returns an error if the local
/// socket cannot be created or the sink rejects the host address.
pub fn init(
    prefix: &str,
    host: &str,
    default_tags: BTreeMap<String, String>,
) -> std::io::Result<()> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;

    let sink = BufferedUdpMetricSink::from(host, socket).map_err(std::io::Error::other)?;
    let queuing = QueuingMetricSink::from(sink);

    set_client(Some(Arc::new(MetricsClient {
        statsd_client: StatsdClient::from_sink(prefix, queuing),
        default_tags,
    })));

    traceline_log::info!("statsd client initialized, sending to {host}");
    Ok(())
}

/// Invokes `f` with the current client, if initialized.
///
/// Returns `R::default()` when no client is configured.
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&MetricsClient) -> R,
    R: Default,
{
    match METRICS_CLIENT.read().as_ref() {
        Some(client) => f(client),
        None => R::default(),
    }
}

/// Serializes tests that swap the global client.
static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with a client that captures all metrics as formatted strings.
///
/// Intended for tests asserting on emitted metrics. Restores the previous
/// client afterwards.
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    let _guard = TEST_LOCK.lock();

    let (rx, sink) = SpyMetricSink::new();
    let previous = set_client(Some(Arc::new(MetricsClient {
        statsd_client: StatsdClient::from_sink("", sink),
        default_tags: BTreeMap::new(),
    })));

    f();
    set_client(previous);

    rx.try_iter()
        .map(|bytes| String::from_utf8(bytes).expect("metric is valid utf-8"))
        .collect()
}

/// A metric for capturing counters.
///
/// Counters are simple values incremented or decremented by the client.
pub trait CounterMetric {
    /// Returns the counter metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for capturing histograms.
///
/// Histograms are values whose distribution is calculated by the server.
pub trait HistogramMetric {
    /// Returns the histogram metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for capturing gauges.
///
/// Gauges record an instantaneous value; only the latest value is retained.
pub trait GaugeMetric {
    /// Returns the gauge metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for capturing timings.
///
/// Timings are a positive number of milliseconds between a start and end
/// time, recorded from a [`std::time::Duration`].
pub trait TimerMetric {
    /// Returns the timer metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// Emits a metric through the global client.
///
/// See the crate level documentation for examples.
#[macro_export]
macro_rules! metric {
    // counter increment
    (counter($id:expr) += $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client
                    .statsd_client
                    .count_with_tags($crate::CounterMetric::name(&$id), $value)
                    $(.with_tag(stringify!($k), $v))*
            )
        })
    };

    // counter decrement
    (counter($id:expr) -= $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client
                    .statsd_client
                    .count_with_tags($crate::CounterMetric::name(&$id), -$value)
                    $(.with_tag(stringify!($k), $v))*
            )
        })
    };

    // gauge set
    (gauge($id:expr) = $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client
                    .statsd_client
                    .gauge_with_tags($crate::GaugeMetric::name(&$id), $value)
                    $(.with_tag(stringify!($k), $v))*
            )
        })
    };

    // histogram value
    (histogram($id:expr) = $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client
                    .statsd_client
                    .histogram_with_tags($crate::HistogramMetric::name(&$id), $value)
                    $(.with_tag(stringify!($k), $v))*
            )
        })
    };

    // timer value
    (timer($id:expr) = $value:expr $(, $k:ident = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client
                    .statsd_client
                    .time_with_tags($crate::TimerMetric::name(&$id), $value)
                    $(.with_tag(stringify!($k), $v))*
            )
        })
    };

    // timed block
    (timer($id:expr), $($k:ident = $v:expr,)* $block:block) => {{
        let now = std::time::Instant::now();
        let rv = { $block };
        $crate::metric!(timer($id) = now.elapsed() $(, $k = $v)*);
        rv
    }};
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    enum TestCounters {
        Accepted,
        Rejected,
    }

    impl CounterMetric for TestCounters {
        fn name(&self) -> &'static str {
            match self {
                Self::Accepted => "accepted",
                Self::Rejected => "rejected",
            }
        }
    }

    struct TestGauge;

    impl GaugeMetric for TestGauge {
        fn name(&self) -> &'static str {
            "queue_length"
        }
    }

    struct TestTimer;

    impl TimerMetric for TestTimer {
        fn name(&self) -> &'static str {
            "processing"
        }
    }

    #[test]
    fn capturing_client_formats_tags() {
        let captures = with_capturing_test_client(|| {
            metric!(counter(TestCounters::Accepted) += 1, resource = "ingestion");
            metric!(counter(TestCounters::Rejected) += 2);
        });

        assert_eq!(
            captures,
            ["accepted:1|c|#resource:ingestion", "rejected:2|c"]
        );
    }

    #[test]
    fn gauge_and_timer() {
        let captures = with_capturing_test_client(|| {
            metric!(gauge(TestGauge) = 42);
            metric!(timer(TestTimer) = Duration::from_millis(210));
        });

        assert_eq!(captures, ["queue_length:42|g", "processing:210|ms"]);
    }

    #[test]
    fn timed_block_returns_value() {
        let mut result = 0;
        let captures = with_capturing_test_client(|| {
            result = metric!(timer(TestTimer), { 6 * 7 });
        });

        assert_eq!(result, 42);
        assert_eq!(captures.len(), 1);
        assert!(captures[0].starts_with("processing:"));
        assert!(captures[0].ends_with("|ms"));
    }

    #[test]
    fn uninitialized_client_is_noop() {
        let _guard = TEST_LOCK.lock();
        // Must not panic without a configured client.
        metric!(counter(TestCounters::Accepted) += 1);
    }
}
