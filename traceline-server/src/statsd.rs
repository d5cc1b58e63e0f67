use traceline_statsd::{CounterMetric, HistogramMetric, TimerMetric};

/// Counter metrics of the ingestion service.
pub enum ServerCounters {
    /// Incremented for every HTTP request, tagged with `route` and `method`.
    Requests,
    /// Incremented per response, tagged with `status_code`, `route` and `method`.
    ResponsesStatusCodes,
    /// Incremented for every received ingestion batch.
    BatchReceived,
    /// Incremented per processed event.
    ///
    /// Tagged with `event_type` and `handling` (`success` or `failure`).
    EventProcessed,
    /// Incremented when a request is rejected due to an exhausted budget.
    ///
    /// Tagged with `org_id`, `plan` and `resource`.
    RateLimitExceeded,
    /// Incremented when the trace fan-out to the worker service fails.
    WorkerDispatchFailed,
}

impl CounterMetric for ServerCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::Requests => "server.requests",
            Self::ResponsesStatusCodes => "server.responses.status_codes",
            Self::BatchReceived => "ingestion.batch_received",
            Self::EventProcessed => "ingestion.event_processed",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::WorkerDispatchFailed => "ingestion.worker_dispatch_failed",
        }
    }
}

/// Timer metrics of the ingestion service.
pub enum ServerTimers {
    /// Wall time per HTTP request, tagged with `route` and `method`.
    RequestsDuration,
    /// Wall time spent processing one ingestion batch.
    BatchProcessing,
}

impl TimerMetric for ServerTimers {
    fn name(&self) -> &'static str {
        match self {
            Self::RequestsDuration => "server.requests.duration",
            Self::BatchProcessing => "ingestion.batch_processing",
        }
    }
}

/// Histogram metrics of the ingestion service.
pub enum ServerHistograms {
    /// Number of events per ingestion batch.
    BatchSize,
}

impl HistogramMetric for ServerHistograms {
    fn name(&self) -> &'static str {
        match self {
            Self::BatchSize => "ingestion.batch_size",
        }
    }
}
