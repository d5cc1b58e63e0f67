//! Evaluation business logic.
//!
//! [`create_eval_jobs`] turns one upserted trace into pending job executions
//! according to the project's evaluation rules. [`evaluate`] runs one job
//! execution end to end: render the judge prompt from the trace, call the
//! project's LLM provider, persist the resulting score, and complete the
//! execution.

mod filter;
mod scorer;
mod template;

pub use self::filter::*;
pub use self::scorer::*;
pub use self::template::*;

use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use traceline_event_schema::{EvalExecutionJob, TraceUpsertJob};
use traceline_queue::RedisQueue;
use traceline_store::{Store, StoreError};

/// An error during evaluation work.
///
/// Expected errors are part of normal operation (a deleted trace, a project
/// without a provider key, a provider outage) and bypass exception
/// reporting; everything else is reported.
#[derive(Debug, Error)]
pub enum EvalError {
    /// A referenced entity no longer exists.
    #[error("{0}")]
    NotFound(String),

    /// The project has no API key configured for the provider.
    #[error("API key for provider \"{0}\" not found")]
    MissingProviderKey(String),

    /// The LLM provider rejected or failed the request.
    #[error("provider request failed: {0}")]
    Api(#[from] ScorerError),

    /// A database operation failed.
    #[error(transparent)]
    Db(#[from] StoreError),

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl EvalError {
    /// Whether this error is expected and must not be reported to the
    /// error tracker.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::MissingProviderKey(_) | Self::Api(_)
        )
    }

    /// The error text persisted on the failed job execution.
    ///
    /// Known domain errors surface their message; infrastructure errors are
    /// masked so internals never reach user-visible state.
    pub fn display_error(&self) -> String {
        match self {
            Self::NotFound(_) | Self::MissingProviderKey(_) | Self::Api(_) => self.to_string(),
            Self::Db(_) | Self::Internal(_) => "An internal error occurred".to_owned(),
        }
    }
}

/// Materializes evaluation jobs for one upserted trace.
///
/// Loads the project's active rules, applies each rule's trace filter and
/// sampling rate, inserts a pending job execution per admitted rule
/// (idempotent on `(project, rule, trace)`), and enqueues the execution with
/// the rule's delay. Redelivered trace-upsert jobs find the existing
/// executions and enqueue nothing new.
pub async fn create_eval_jobs(
    store: &Store,
    exec_queue: &RedisQueue,
    job: &TraceUpsertJob,
) -> Result<usize, EvalError> {
    let configurations = store.active_job_configurations(&job.project_id).await?;
    if configurations.is_empty() {
        return Ok(0);
    }

    let trace = store
        .trace_for_eval(&job.project_id, &job.trace_id)
        .await?
        .ok_or_else(|| EvalError::NotFound(format!("trace {} not found", job.trace_id)))?;

    let mut created = 0;
    for configuration in configurations {
        if !trace_matches(configuration.filter.as_ref(), &trace) {
            continue;
        }

        if configuration.sampling < 1.0
            && rand::thread_rng().gen::<f64>() >= configuration.sampling
        {
            traceline_log::debug!(
                configuration_id = %configuration.id,
                trace_id = job.trace_id,
                "trace not sampled for evaluation",
            );
            continue;
        }

        let Some(execution_id) = store
            .insert_job_execution(&job.project_id, configuration.id, &job.trace_id)
            .await?
        else {
            // Already scheduled by an earlier delivery.
            continue;
        };

        let delay = Duration::from_millis(configuration.delay_ms.max(0) as u64);
        exec_queue
            .enqueue_in(
                EvalExecutionJob {
                    job_execution_id: execution_id,
                    project_id: job.project_id.clone(),
                },
                delay,
            )
            .await
            .map_err(|error| EvalError::Internal(format!("failed to enqueue eval job: {error}")))?;

        created += 1;
    }

    Ok(created)
}

/// Runs one evaluation job execution.
///
/// Terminal executions are skipped, which makes queue redeliveries after a
/// crash harmless.
pub async fn evaluate(
    store: &Store,
    scorer: &dyn LlmScorer,
    job: &EvalExecutionJob,
) -> Result<(), EvalError> {
    let execution = store
        .job_execution(job.job_execution_id, &job.project_id)
        .await?
        .ok_or_else(|| {
            EvalError::NotFound(format!("job execution {} not found", job.job_execution_id))
        })?;

    if execution.status == "COMPLETED" || execution.status == "CANCELLED" {
        traceline_log::debug!(
            job_execution_id = %execution.id,
            status = execution.status,
            "skipping terminal job execution",
        );
        return Ok(());
    }

    let trace = store
        .trace_for_eval(&job.project_id, &execution.trace_id)
        .await?
        .ok_or_else(|| EvalError::NotFound(format!("trace {} not found", execution.trace_id)))?;

    let prompt = render_template(
        &execution.template,
        execution.variable_mapping.as_ref(),
        &trace,
    );

    let api_key = store
        .llm_api_key(&job.project_id, &execution.provider)
        .await?
        .ok_or_else(|| EvalError::MissingProviderKey(execution.provider.clone()))?;

    let output = scorer
        .score(ScoreRequest {
            provider: &execution.provider,
            model: &execution.model,
            api_key: &api_key,
            prompt: &prompt,
        })
        .await?;

    let score_id = store
        .insert_eval_score(
            &job.project_id,
            &execution.trace_id,
            &execution.score_name,
            output.score,
            output.reasoning.as_deref(),
        )
        .await?;

    store
        .complete_job_execution(execution.id, &job.project_id, &score_id)
        .await?;

    traceline_log::debug!(
        job_execution_id = %execution.id,
        score = output.score,
        "evaluation completed",
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_error_masks_infrastructure_failures() {
        let db = EvalError::Db(StoreError::Malformed("boom".to_owned()));
        assert_eq!(db.display_error(), "An internal error occurred");
        assert!(!db.is_expected());

        let internal = EvalError::Internal("queue down".to_owned());
        assert_eq!(internal.display_error(), "An internal error occurred");
    }

    #[test]
    fn display_error_keeps_domain_messages() {
        let missing = EvalError::MissingProviderKey("openai".to_owned());
        assert_eq!(
            missing.display_error(),
            "API key for provider \"openai\" not found"
        );
        assert!(missing.is_expected());

        let not_found = EvalError::NotFound("trace t-1 not found".to_owned());
        assert_eq!(not_found.display_error(), "trace t-1 not found");
        assert!(not_found.is_expected());
    }
}
