use chrono::Utc;
use traceline_event_schema::{JobExecutionStatus, ProjectId};
use uuid::Uuid;

use crate::{JobConfigurationRow, JobExecutionRow, Store, StoreError, TraceRow};

impl Store {
    /// Loads the active evaluation rules for a project targeting traces.
    pub async fn active_job_configurations(
        &self,
        project_id: &ProjectId,
    ) -> Result<Vec<JobConfigurationRow>, StoreError> {
        let rows = sqlx::query_as::<_, JobConfigurationRow>(
            "SELECT c.id, c.project_id, c.filter, c.sampling, c.delay_ms,
                    c.score_name, c.template, c.variable_mapping, c.provider, c.model
             FROM job_configurations c
             WHERE c.project_id = $1
               AND c.target_object = 'trace'
               AND c.status = 'ACTIVE'",
        )
        .bind(project_id.as_str())
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    /// Creates a pending job execution for `(configuration, trace)`.
    ///
    /// Idempotent on that pair: redelivered trace-upsert jobs find the
    /// existing row and return `None`, so no duplicate evaluation is
    /// scheduled.
    pub async fn insert_job_execution(
        &self,
        project_id: &ProjectId,
        job_configuration_id: Uuid,
        trace_id: &str,
    ) -> Result<Option<Uuid>, StoreError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "INSERT INTO job_executions
                 (id, project_id, job_configuration_id, trace_id, status, created_at)
             VALUES ($1, $2, $3, $4, $5, now())
             ON CONFLICT (project_id, job_configuration_id, trace_id) DO NOTHING
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(project_id.as_str())
        .bind(job_configuration_id)
        .bind(trace_id)
        .bind(JobExecutionStatus::Pending.as_str())
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(id,)| id))
    }

    /// Loads a job execution joined with its configuration.
    pub async fn job_execution(
        &self,
        id: Uuid,
        project_id: &ProjectId,
    ) -> Result<Option<JobExecutionRow>, StoreError> {
        let row = sqlx::query_as::<_, JobExecutionRow>(
            "SELECT e.id, e.project_id, e.trace_id, e.status,
                    c.score_name, c.template, c.variable_mapping, c.provider, c.model
             FROM job_executions e
             JOIN job_configurations c ON c.id = e.job_configuration_id
             WHERE e.id = $1 AND e.project_id = $2",
        )
        .bind(id)
        .bind(project_id.as_str())
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Loads the trace columns used for evaluation variable mapping.
    pub async fn trace_for_eval(
        &self,
        project_id: &ProjectId,
        trace_id: &str,
    ) -> Result<Option<TraceRow>, StoreError> {
        let row = sqlx::query_as::<_, TraceRow>(
            "SELECT id, name, user_id, session_id, input, output, metadata,
                    COALESCE(tags, '{}') AS tags, timestamp
             FROM traces
             WHERE id = $1 AND project_id = $2",
        )
        .bind(trace_id)
        .bind(project_id.as_str())
        .fetch_optional(self.pool())
        .await?;

        Ok(row)
    }

    /// Returns the project's API key secret for an LLM provider, if set.
    pub async fn llm_api_key(
        &self,
        project_id: &ProjectId,
        provider: &str,
    ) -> Result<Option<String>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT secret_key FROM llm_api_keys
             WHERE project_id = $1 AND provider = $2",
        )
        .bind(project_id.as_str())
        .bind(provider)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|(key,)| key))
    }

    /// Persists a score produced by an evaluation.
    pub async fn insert_eval_score(
        &self,
        project_id: &ProjectId,
        trace_id: &str,
        name: &str,
        value: f64,
        comment: Option<&str>,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO scores (id, project_id, timestamp, trace_id, name, value, comment, source)
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'EVAL')",
        )
        .bind(&id)
        .bind(project_id.as_str())
        .bind(Utc::now())
        .bind(trace_id)
        .bind(name)
        .bind(value)
        .bind(comment)
        .execute(self.pool())
        .await?;

        Ok(id)
    }

    /// Marks a job execution completed.
    ///
    /// Guarded to non-terminal states so a redelivered job cannot regress a
    /// terminal status.
    pub async fn complete_job_execution(
        &self,
        id: Uuid,
        project_id: &ProjectId,
        score_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE job_executions
             SET status = $3, end_time = now(), score_id = $4, error = NULL
             WHERE id = $1 AND project_id = $2
               AND status NOT IN ('COMPLETED', 'CANCELLED')",
        )
        .bind(id)
        .bind(project_id.as_str())
        .bind(JobExecutionStatus::Completed.as_str())
        .bind(score_id)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Records a terminal failure for a job execution.
    ///
    /// `ERROR` may only overwrite non-terminal states: a retry racing a
    /// completed execution leaves the completion in place.
    pub async fn fail_job_execution(
        &self,
        id: Uuid,
        project_id: &ProjectId,
        display_error: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE job_executions
             SET status = $3, end_time = now(), error = $4
             WHERE id = $1 AND project_id = $2
               AND status NOT IN ('COMPLETED', 'CANCELLED')",
        )
        .bind(id)
        .bind(project_id.as_str())
        .bind(JobExecutionStatus::Error.as_str())
        .bind(display_error)
        .execute(self.pool())
        .await?;

        Ok(())
    }
}
