use std::time::Duration;

use async_trait::async_trait;
use traceline_event_schema::TraceUpsertJob;

use crate::config::WorkerTarget;
use crate::statsd::ServerCounters;

/// Posts trace-upsert notifications to the worker service.
///
/// The fan-out is best effort: an unreachable worker must never fail the
/// ingestion request that triggered it. Failures are logged and counted,
/// nothing more.
#[async_trait]
pub trait TraceDispatcher: Send + Sync {
    async fn dispatch(&self, jobs: Vec<TraceUpsertJob>);
}

/// The production dispatcher, posting to `{host}/api/events`.
pub struct WorkerDispatcher {
    client: reqwest::Client,
    target: Option<WorkerTarget>,
}

impl WorkerDispatcher {
    /// Creates a dispatcher; a missing target disables the fan-out.
    pub fn new(target: Option<WorkerTarget>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self { client, target }
    }
}

#[async_trait]
impl TraceDispatcher for WorkerDispatcher {
    async fn dispatch(&self, jobs: Vec<TraceUpsertJob>) {
        let Some(target) = &self.target else {
            return;
        };

        if jobs.is_empty() {
            return;
        }

        let url = format!("{}/api/events", target.host.trim_end_matches('/'));
        let result = self
            .client
            .post(&url)
            .basic_auth("server", Some(&target.password))
            .json(&jobs)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        if let Err(error) = result {
            traceline_statsd::metric!(counter(ServerCounters::WorkerDispatchFailed) += 1);
            traceline_log::warn!(
                jobs = jobs.len(),
                "failed to notify worker about trace upserts: {error}",
            );
        }
    }
}
