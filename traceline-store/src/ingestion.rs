use chrono::{DateTime, Utc};
use serde_json::Value;
use traceline_event_schema::{ObservationBody, ProjectId, ScoreBody, TraceBody};
use uuid::Uuid;

use crate::{Store, StoreError};

impl Store {
    /// Appends the cleaned event to the raw-event audit log.
    ///
    /// This runs before typed processing; its failure aborts the event with
    /// a retryable error.
    pub async fn insert_raw_event(
        &self,
        project_id: &ProjectId,
        event_id: &str,
        event_type: &str,
        payload: &Value,
        metadata: Option<&Value>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO events_raw (id, project_id, event_id, event_type, payload, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, now())",
        )
        .bind(Uuid::new_v4())
        .bind(project_id.as_str())
        .bind(event_id)
        .bind(event_type)
        .bind(payload)
        .bind(metadata)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Idempotently upserts a trace, returning its id.
    ///
    /// Conflicting upserts are last-writer-wins per column: absent fields
    /// keep their stored value.
    pub async fn upsert_trace(
        &self,
        project_id: &ProjectId,
        timestamp: DateTime<Utc>,
        body: &TraceBody,
    ) -> Result<String, StoreError> {
        let id = body
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        sqlx::query(
            "INSERT INTO traces
                 (id, project_id, timestamp, name, user_id, session_id, input, output,
                  metadata, tags, release, version, public)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (id, project_id) DO UPDATE SET
                 timestamp  = EXCLUDED.timestamp,
                 name       = COALESCE(EXCLUDED.name, traces.name),
                 user_id    = COALESCE(EXCLUDED.user_id, traces.user_id),
                 session_id = COALESCE(EXCLUDED.session_id, traces.session_id),
                 input      = COALESCE(EXCLUDED.input, traces.input),
                 output     = COALESCE(EXCLUDED.output, traces.output),
                 metadata   = COALESCE(EXCLUDED.metadata, traces.metadata),
                 tags       = CASE WHEN cardinality(EXCLUDED.tags) > 0 THEN EXCLUDED.tags ELSE traces.tags END,
                 release    = COALESCE(EXCLUDED.release, traces.release),
                 version    = COALESCE(EXCLUDED.version, traces.version),
                 public     = EXCLUDED.public",
        )
        .bind(&id)
        .bind(project_id.as_str())
        .bind(timestamp)
        .bind(&body.name)
        .bind(&body.user_id)
        .bind(&body.session_id)
        .bind(&body.input)
        .bind(&body.output)
        .bind(&body.metadata)
        .bind(&body.tags)
        .bind(&body.release)
        .bind(&body.version)
        .bind(body.public)
        .execute(self.pool())
        .await?;

        Ok(id)
    }

    /// Idempotently upserts an observation created by a `*_CREATE` event.
    pub async fn upsert_observation(
        &self,
        project_id: &ProjectId,
        observation_type: &str,
        body: &ObservationBody,
    ) -> Result<String, StoreError> {
        let id = body
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        sqlx::query(
            "INSERT INTO observations
                 (id, project_id, trace_id, type, name, start_time, end_time,
                  completion_start_time, model, model_parameters, input, output,
                  metadata, level, status_message, parent_observation_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
             ON CONFLICT (id, project_id) DO UPDATE SET
                 trace_id              = COALESCE(EXCLUDED.trace_id, observations.trace_id),
                 type                  = EXCLUDED.type,
                 name                  = COALESCE(EXCLUDED.name, observations.name),
                 start_time            = COALESCE(EXCLUDED.start_time, observations.start_time),
                 end_time              = COALESCE(EXCLUDED.end_time, observations.end_time),
                 completion_start_time = COALESCE(EXCLUDED.completion_start_time, observations.completion_start_time),
                 model                 = COALESCE(EXCLUDED.model, observations.model),
                 model_parameters      = COALESCE(EXCLUDED.model_parameters, observations.model_parameters),
                 input                 = COALESCE(EXCLUDED.input, observations.input),
                 output                = COALESCE(EXCLUDED.output, observations.output),
                 metadata              = COALESCE(EXCLUDED.metadata, observations.metadata),
                 level                 = COALESCE(EXCLUDED.level, observations.level),
                 status_message        = COALESCE(EXCLUDED.status_message, observations.status_message),
                 parent_observation_id = COALESCE(EXCLUDED.parent_observation_id, observations.parent_observation_id)",
        )
        .bind(&id)
        .bind(project_id.as_str())
        .bind(&body.trace_id)
        .bind(observation_type)
        .bind(&body.name)
        .bind(&body.start_time)
        .bind(&body.end_time)
        .bind(&body.completion_start_time)
        .bind(&body.model)
        .bind(&body.model_parameters)
        .bind(&body.input)
        .bind(&body.output)
        .bind(&body.metadata)
        .bind(&body.level)
        .bind(&body.status_message)
        .bind(&body.parent_observation_id)
        .execute(self.pool())
        .await?;

        Ok(id)
    }

    /// Applies a `*_UPDATE` event to an existing observation.
    ///
    /// Returns `None` when no observation with that id exists in the
    /// project; the processor maps that to a not-found error.
    pub async fn update_observation(
        &self,
        project_id: &ProjectId,
        observation_id: &str,
        body: &ObservationBody,
    ) -> Result<Option<String>, StoreError> {
        let id: Option<(String,)> = sqlx::query_as(
            "UPDATE observations SET
                 name                  = COALESCE($3, name),
                 end_time              = COALESCE($4, end_time),
                 completion_start_time = COALESCE($5, completion_start_time),
                 model                 = COALESCE($6, model),
                 model_parameters      = COALESCE($7, model_parameters),
                 input                 = COALESCE($8, input),
                 output                = COALESCE($9, output),
                 metadata              = COALESCE($10, metadata),
                 level                 = COALESCE($11, level),
                 status_message        = COALESCE($12, status_message)
             WHERE id = $1 AND project_id = $2
             RETURNING id",
        )
        .bind(observation_id)
        .bind(project_id.as_str())
        .bind(&body.name)
        .bind(&body.end_time)
        .bind(&body.completion_start_time)
        .bind(&body.model)
        .bind(&body.model_parameters)
        .bind(&body.input)
        .bind(&body.output)
        .bind(&body.metadata)
        .bind(&body.level)
        .bind(&body.status_message)
        .fetch_optional(self.pool())
        .await?;

        Ok(id.map(|(id,)| id))
    }

    /// Idempotently upserts a score submitted through the ingestion API.
    pub async fn upsert_score(
        &self,
        project_id: &ProjectId,
        timestamp: DateTime<Utc>,
        body: &ScoreBody,
    ) -> Result<String, StoreError> {
        let id = body
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        sqlx::query(
            "INSERT INTO scores
                 (id, project_id, timestamp, trace_id, observation_id, name, value, comment, source)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'API')
             ON CONFLICT (id, project_id) DO UPDATE SET
                 timestamp      = EXCLUDED.timestamp,
                 trace_id       = EXCLUDED.trace_id,
                 observation_id = EXCLUDED.observation_id,
                 name           = EXCLUDED.name,
                 value          = EXCLUDED.value,
                 comment        = COALESCE(EXCLUDED.comment, scores.comment)",
        )
        .bind(&id)
        .bind(project_id.as_str())
        .bind(timestamp)
        .bind(&body.trace_id)
        .bind(&body.observation_id)
        .bind(&body.name)
        .bind(body.value)
        .bind(&body.comment)
        .execute(self.pool())
        .await?;

        Ok(id)
    }

    /// Records an SDK debug log event.
    pub async fn insert_sdk_log(
        &self,
        project_id: &ProjectId,
        timestamp: DateTime<Utc>,
        log: &Value,
    ) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO sdk_logs (id, project_id, timestamp, log)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&id)
        .bind(project_id.as_str())
        .bind(timestamp)
        .bind(log)
        .execute(self.pool())
        .await?;

        Ok(id)
    }
}
