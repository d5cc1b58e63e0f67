use traceline_statsd::{CounterMetric, GaugeMetric, HistogramMetric};

/// Counter metrics of the worker service.
pub enum WorkerCounters {
    /// Incremented per consumed trace-upsert job.
    TraceUpsertQueueRequest,
    /// Incremented per consumed eval-execution job.
    EvalExecutionQueueRequest,
    /// Incremented per trace-upsert notification received over HTTP.
    EventsReceived,
}

impl CounterMetric for WorkerCounters {
    fn name(&self) -> &'static str {
        match self {
            Self::TraceUpsertQueueRequest => "trace_upsert_queue_request",
            Self::EvalExecutionQueueRequest => "eval_execution_queue_request",
            Self::EventsReceived => "worker.events_received",
        }
    }
}

/// Histogram metrics of the worker service.
pub enum WorkerHistograms {
    /// Milliseconds a trace-upsert job waited in the queue before pickup.
    TraceUpsertQueueWaitTime,
    /// Milliseconds spent processing one trace-upsert job.
    TraceUpsertQueueProcessingTime,
    /// Milliseconds an eval-execution job waited in the queue before pickup.
    EvalExecutionQueueWaitTime,
    /// Milliseconds spent processing one eval-execution job.
    EvalExecutionQueueProcessingTime,
}

impl HistogramMetric for WorkerHistograms {
    fn name(&self) -> &'static str {
        match self {
            Self::TraceUpsertQueueWaitTime => "trace_upsert_queue_wait_time",
            Self::TraceUpsertQueueProcessingTime => "trace_upsert_queue_processing_time",
            Self::EvalExecutionQueueWaitTime => "eval_execution_queue_wait_time",
            Self::EvalExecutionQueueProcessingTime => "eval_execution_queue_processing_time",
        }
    }
}

/// Gauge metrics of the worker service.
pub enum WorkerGauges {
    /// Length of the trace-upsert queue after a job was processed.
    TraceUpsertQueueLength,
    /// Length of the eval-execution queue after a job was processed.
    EvalExecutionQueueLength,
}

impl GaugeMetric for WorkerGauges {
    fn name(&self) -> &'static str {
        match self {
            Self::TraceUpsertQueueLength => "trace_upsert_queue_length",
            Self::EvalExecutionQueueLength => "eval_execution_queue_length",
        }
    }
}
