//! Per-event-type processors.
//!
//! Every event type maps to one of four handlers behind the common
//! [`EventProcessor`] capability. Processors persist exactly one domain
//! entity, idempotently on `(project_id, id)`, and return the persisted
//! entity's id for downstream fan-out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use traceline_event_schema::{
    AccessLevel, ApiKeyScope, IngestionEvent, ObservationBody, ScoreBody, SdkLogBody, TraceBody,
};

use crate::error::IngestError;
use crate::services::EntityStore;

/// The kind of entity a processor persisted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessedKind {
    Trace,
    Observation,
    Score,
    SdkLog,
}

/// The outcome of processing one event.
#[derive(Clone, Debug)]
pub struct ProcessedEvent {
    pub kind: ProcessedKind,
    /// Id of the persisted entity.
    pub id: String,
}

/// The per-type handler capability.
#[async_trait]
pub trait EventProcessor: Send + Sync {
    async fn process(
        &self,
        store: &dyn EntityStore,
        scope: &ApiKeyScope,
    ) -> Result<ProcessedEvent, IngestError>;
}

/// Rejects events the key's access level does not permit.
///
/// Runs before processor dispatch: keys scoped to scores may submit nothing
/// but `SCORE_CREATE`. The processors re-check as defense in depth.
pub fn ensure_access(scope: &ApiKeyScope, event: &IngestionEvent) -> Result<(), IngestError> {
    match (scope.access_level, event) {
        (AccessLevel::All, _) | (AccessLevel::Scores, IngestionEvent::ScoreCreate { .. }) => Ok(()),
        (AccessLevel::Scores, _) => Err(IngestError::Authentication(format!(
            "access level 'scores' cannot submit {} events",
            event.type_name(),
        ))),
    }
}

/// Returns the processor handling `event`.
pub fn processor_for(event: &IngestionEvent) -> Box<dyn EventProcessor + '_> {
    match event {
        IngestionEvent::TraceCreate { timestamp, body, .. } => Box::new(TraceProcessor {
            timestamp: *timestamp,
            body,
        }),
        IngestionEvent::ScoreCreate { timestamp, body, .. } => Box::new(ScoreProcessor {
            timestamp: *timestamp,
            body,
        }),
        IngestionEvent::SdkLog { timestamp, body, .. } => Box::new(SdkLogProcessor {
            timestamp: *timestamp,
            body,
        }),
        IngestionEvent::ObservationCreate { body, .. }
        | IngestionEvent::ObservationUpdate { body, .. }
        | IngestionEvent::SpanCreate { body, .. }
        | IngestionEvent::SpanUpdate { body, .. }
        | IngestionEvent::GenerationCreate { body, .. }
        | IngestionEvent::GenerationUpdate { body, .. }
        | IngestionEvent::EventCreate { body, .. } => Box::new(ObservationProcessor {
            event,
            body,
        }),
    }
}

fn require_full_access(scope: &ApiKeyScope) -> Result<(), IngestError> {
    if scope.access_level == AccessLevel::All {
        Ok(())
    } else {
        Err(IngestError::Authentication(
            "access level 'scores' cannot modify this entity".to_owned(),
        ))
    }
}

/// Handles `TRACE_CREATE`.
pub struct TraceProcessor<'a> {
    timestamp: DateTime<Utc>,
    body: &'a TraceBody,
}

#[async_trait]
impl EventProcessor for TraceProcessor<'_> {
    async fn process(
        &self,
        store: &dyn EntityStore,
        scope: &ApiKeyScope,
    ) -> Result<ProcessedEvent, IngestError> {
        require_full_access(scope)?;

        let id = store
            .upsert_trace(&scope.project_id, self.timestamp, self.body)
            .await?;

        Ok(ProcessedEvent {
            kind: ProcessedKind::Trace,
            id,
        })
    }
}

/// Handles the observation family, creates and updates alike.
pub struct ObservationProcessor<'a> {
    event: &'a IngestionEvent,
    body: &'a ObservationBody,
}

#[async_trait]
impl EventProcessor for ObservationProcessor<'_> {
    async fn process(
        &self,
        store: &dyn EntityStore,
        scope: &ApiKeyScope,
    ) -> Result<ProcessedEvent, IngestError> {
        require_full_access(scope)?;

        let id = if self.event.is_observation_update() {
            let observation_id = self.body.id.as_deref().ok_or_else(|| {
                IngestError::BadRequest("observation updates require an id".to_owned())
            })?;

            store
                .update_observation(&scope.project_id, observation_id, self.body)
                .await?
                .ok_or_else(|| {
                    IngestError::NotFound(format!("observation {observation_id} not found"))
                })?
        } else {
            let observation_type = self.event.observation_type().ok_or_else(|| {
                IngestError::BadRequest("observation type is required".to_owned())
            })?;

            store
                .upsert_observation(&scope.project_id, observation_type.name(), self.body)
                .await?
        };

        Ok(ProcessedEvent {
            kind: ProcessedKind::Observation,
            id,
        })
    }
}

/// Handles `SCORE_CREATE`, the only type score-scoped keys may submit.
pub struct ScoreProcessor<'a> {
    timestamp: DateTime<Utc>,
    body: &'a ScoreBody,
}

#[async_trait]
impl EventProcessor for ScoreProcessor<'_> {
    async fn process(
        &self,
        store: &dyn EntityStore,
        scope: &ApiKeyScope,
    ) -> Result<ProcessedEvent, IngestError> {
        let id = store
            .upsert_score(&scope.project_id, self.timestamp, self.body)
            .await?;

        Ok(ProcessedEvent {
            kind: ProcessedKind::Score,
            id,
        })
    }
}

/// Handles `SDK_LOG` debug events.
pub struct SdkLogProcessor<'a> {
    timestamp: DateTime<Utc>,
    body: &'a SdkLogBody,
}

#[async_trait]
impl EventProcessor for SdkLogProcessor<'_> {
    async fn process(
        &self,
        store: &dyn EntityStore,
        scope: &ApiKeyScope,
    ) -> Result<ProcessedEvent, IngestError> {
        require_full_access(scope)?;

        let id = store
            .insert_sdk_log(&scope.project_id, self.timestamp, &self.body.log)
            .await?;

        Ok(ProcessedEvent {
            kind: ProcessedKind::SdkLog,
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use traceline_event_schema::{EventId, ProjectId};

    fn scope(level: AccessLevel) -> ApiKeyScope {
        ApiKeyScope {
            project_id: ProjectId::new("proj-1"),
            access_level: level,
        }
    }

    fn trace_create() -> IngestionEvent {
        IngestionEvent::TraceCreate {
            id: EventId::new("e-1"),
            timestamp: Utc::now(),
            body: TraceBody::default(),
        }
    }

    fn score_create() -> IngestionEvent {
        IngestionEvent::ScoreCreate {
            id: EventId::new("e-2"),
            timestamp: Utc::now(),
            body: ScoreBody {
                id: None,
                trace_id: "t-1".to_owned(),
                name: "quality".to_owned(),
                value: 0.9,
                observation_id: None,
                comment: None,
            },
        }
    }

    #[test]
    fn scores_scope_admits_only_score_create() {
        let scores = scope(AccessLevel::Scores);
        assert!(ensure_access(&scores, &score_create()).is_ok());

        let denied = ensure_access(&scores, &trace_create());
        assert!(matches!(denied, Err(IngestError::Authentication(_))));
    }

    #[test]
    fn all_scope_admits_everything() {
        let all = scope(AccessLevel::All);
        assert!(ensure_access(&all, &trace_create()).is_ok());
        assert!(ensure_access(&all, &score_create()).is_ok());
    }
}
