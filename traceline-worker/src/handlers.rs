//! Queue handlers wiring the evaluation logic into the consumer pools.
//!
//! Both handlers follow the same discipline: record queue metrics, run the
//! business function inside a consumer span, and re-throw errors after
//! side effects so the queue schedules redelivery.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use traceline_event_schema::{EvalExecutionJob, TraceUpsertJob};
use traceline_log::Instrument;
use traceline_queue::{Delivery, HandlerError, JobHandler, RedisQueue};
use traceline_store::Store;

use crate::eval::{create_eval_jobs, evaluate, LlmScorer};
use crate::statsd::{WorkerCounters, WorkerGauges, WorkerHistograms};

fn queue_wait_ms<T>(delivery: &Delivery<T>) -> u64 {
    (Utc::now() - delivery.envelope.enqueued_at)
        .num_milliseconds()
        .max(0) as u64
}

/// Consumes trace-upsert jobs and materializes evaluation jobs.
pub struct EvalJobCreator {
    store: Store,
    trace_queue: RedisQueue,
    exec_queue: RedisQueue,
}

impl EvalJobCreator {
    pub fn new(store: Store, trace_queue: RedisQueue, exec_queue: RedisQueue) -> Self {
        Self {
            store,
            trace_queue,
            exec_queue,
        }
    }
}

#[async_trait]
impl JobHandler<TraceUpsertJob> for EvalJobCreator {
    async fn handle(&self, delivery: &Delivery<TraceUpsertJob>) -> Result<(), HandlerError> {
        traceline_statsd::metric!(counter(WorkerCounters::TraceUpsertQueueRequest) += 1);
        traceline_statsd::metric!(
            histogram(WorkerHistograms::TraceUpsertQueueWaitTime) = queue_wait_ms(delivery)
        );

        let job = &delivery.envelope.payload;
        let started = Instant::now();

        // Root span: each consumed trace starts a fresh trace context.
        let result = create_eval_jobs(&self.store, &self.exec_queue, job)
            .instrument(traceline_log::span("trace_upsert", true))
            .await;

        if let Ok(length) = self.trace_queue.len().await {
            traceline_statsd::metric!(gauge(WorkerGauges::TraceUpsertQueueLength) = length);
        }
        traceline_statsd::metric!(
            histogram(WorkerHistograms::TraceUpsertQueueProcessingTime) =
                started.elapsed().as_millis() as u64
        );

        match result {
            Ok(created) => {
                traceline_log::debug!(
                    trace_id = job.trace_id,
                    project_id = job.project_id.as_str(),
                    created,
                    "eval jobs created",
                );
                Ok(())
            }
            Err(error) => {
                traceline_log::error!(
                    trace_id = job.trace_id,
                    project_id = job.project_id.as_str(),
                    "failed to create eval jobs: {}",
                    traceline_log::LogError(&error),
                );
                traceline_log::capture_error(&error);
                Err(error.into())
            }
        }
    }
}

/// Consumes eval-execution jobs and runs the evaluation.
pub struct EvalJobExecutor {
    store: Store,
    exec_queue: RedisQueue,
    scorer: Arc<dyn LlmScorer>,
}

impl EvalJobExecutor {
    pub fn new(store: Store, exec_queue: RedisQueue, scorer: Arc<dyn LlmScorer>) -> Self {
        Self {
            store,
            exec_queue,
            scorer,
        }
    }
}

#[async_trait]
impl JobHandler<EvalExecutionJob> for EvalJobExecutor {
    async fn handle(&self, delivery: &Delivery<EvalExecutionJob>) -> Result<(), HandlerError> {
        traceline_statsd::metric!(counter(WorkerCounters::EvalExecutionQueueRequest) += 1);
        traceline_statsd::metric!(
            histogram(WorkerHistograms::EvalExecutionQueueWaitTime) = queue_wait_ms(delivery)
        );

        let job = &delivery.envelope.payload;
        let started = Instant::now();

        // Child span: execution belongs to the creator's trace context.
        let result = evaluate(&self.store, self.scorer.as_ref(), job)
            .instrument(traceline_log::span("eval_execution", false))
            .await;

        if let Ok(length) = self.exec_queue.len().await {
            traceline_statsd::metric!(gauge(WorkerGauges::EvalExecutionQueueLength) = length);
        }
        traceline_statsd::metric!(
            histogram(WorkerHistograms::EvalExecutionQueueProcessingTime) =
                started.elapsed().as_millis() as u64
        );

        let Err(error) = result else {
            return Ok(());
        };

        // Terminal failure state first: the row must say ERROR even if this
        // attempt was the last one.
        let display_error = error.display_error();
        if let Err(persist_error) = self
            .store
            .fail_job_execution(job.job_execution_id, &job.project_id, &display_error)
            .await
        {
            traceline_log::error!(
                job_execution_id = %job.job_execution_id,
                "failed to persist job execution failure: {}",
                traceline_log::LogError(&persist_error),
            );
        }

        // Expected failures (provider outages, missing provider keys) stay
        // out of the error tracker to keep alerts meaningful.
        if error.is_expected() {
            traceline_log::debug!(
                job_execution_id = %job.job_execution_id,
                "evaluation failed with expected error: {display_error}",
            );
        } else {
            traceline_log::error!(
                job_execution_id = %job.job_execution_id,
                "evaluation failed: {}",
                traceline_log::LogError(&error),
            );
            traceline_log::capture_error(&error);
        }

        Err(error.into())
    }
}
