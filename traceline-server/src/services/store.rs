use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use traceline_event_schema::{ObservationBody, ProjectId, ScoreBody, TraceBody};
use traceline_store::{Store, StoreError};

/// The persistence operations used by event processors.
///
/// A seam over [`Store`] so that the ingestion coordinator and the
/// processors can be exercised against an in-memory implementation in tests.
/// All writes are idempotent on `(project_id, id)`.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Appends the cleaned event to the raw-event audit log.
    async fn insert_raw_event(
        &self,
        project_id: &ProjectId,
        event_id: &str,
        event_type: &str,
        payload: &Value,
        metadata: Option<&Value>,
    ) -> Result<(), StoreError>;

    /// Upserts a trace, returning its id.
    async fn upsert_trace(
        &self,
        project_id: &ProjectId,
        timestamp: DateTime<Utc>,
        body: &TraceBody,
    ) -> Result<String, StoreError>;

    /// Upserts an observation, returning its id.
    async fn upsert_observation(
        &self,
        project_id: &ProjectId,
        observation_type: &str,
        body: &ObservationBody,
    ) -> Result<String, StoreError>;

    /// Applies an update to an existing observation.
    ///
    /// Returns `None` when the observation does not exist.
    async fn update_observation(
        &self,
        project_id: &ProjectId,
        observation_id: &str,
        body: &ObservationBody,
    ) -> Result<Option<String>, StoreError>;

    /// Upserts a score, returning its id.
    async fn upsert_score(
        &self,
        project_id: &ProjectId,
        timestamp: DateTime<Utc>,
        body: &ScoreBody,
    ) -> Result<String, StoreError>;

    /// Records an SDK debug log, returning its id.
    async fn insert_sdk_log(
        &self,
        project_id: &ProjectId,
        timestamp: DateTime<Utc>,
        log: &Value,
    ) -> Result<String, StoreError>;
}

#[async_trait]
impl EntityStore for Store {
    async fn insert_raw_event(
        &self,
        project_id: &ProjectId,
        event_id: &str,
        event_type: &str,
        payload: &Value,
        metadata: Option<&Value>,
    ) -> Result<(), StoreError> {
        Store::insert_raw_event(self, project_id, event_id, event_type, payload, metadata).await
    }

    async fn upsert_trace(
        &self,
        project_id: &ProjectId,
        timestamp: DateTime<Utc>,
        body: &TraceBody,
    ) -> Result<String, StoreError> {
        Store::upsert_trace(self, project_id, timestamp, body).await
    }

    async fn upsert_observation(
        &self,
        project_id: &ProjectId,
        observation_type: &str,
        body: &ObservationBody,
    ) -> Result<String, StoreError> {
        Store::upsert_observation(self, project_id, observation_type, body).await
    }

    async fn update_observation(
        &self,
        project_id: &ProjectId,
        observation_id: &str,
        body: &ObservationBody,
    ) -> Result<Option<String>, StoreError> {
        Store::update_observation(self, project_id, observation_id, body).await
    }

    async fn upsert_score(
        &self,
        project_id: &ProjectId,
        timestamp: DateTime<Utc>,
        body: &ScoreBody,
    ) -> Result<String, StoreError> {
        Store::upsert_score(self, project_id, timestamp, body).await
    }

    async fn insert_sdk_log(
        &self,
        project_id: &ProjectId,
        timestamp: DateTime<Utc>,
        log: &Value,
    ) -> Result<String, StoreError> {
        Store::insert_sdk_log(self, project_id, timestamp, log).await
    }
}
