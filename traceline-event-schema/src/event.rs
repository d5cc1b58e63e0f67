use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::EventId;

/// The batch envelope submitted to the ingestion endpoint.
///
/// Batch elements stay raw JSON here: a single malformed event must produce a
/// per-event error slot, not an envelope-level failure, so per-event parsing
/// into [`IngestionEvent`] happens one element at a time in the coordinator.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BatchEnvelope {
    /// The submitted events, heterogeneous and unparsed.
    pub batch: Vec<Value>,

    /// Optional SDK metadata echoed into the audit log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// The kind of observation described by an observation-family event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObservationType {
    Span,
    Generation,
    Event,
}

impl ObservationType {
    /// Returns the canonical name persisted with the observation.
    pub fn name(self) -> &'static str {
        match self {
            Self::Span => "SPAN",
            Self::Generation => "GENERATION",
            Self::Event => "EVENT",
        }
    }
}

/// Body of `TRACE_CREATE` events.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceBody {
    /// Client-assigned trace id; generated server-side when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub public: bool,
}

/// Body shared by all observation-family events.
///
/// `SPAN_*`, `GENERATION_*` and `EVENT_CREATE` are legacy aliases that fix
/// the observation type; `OBSERVATION_*` carries it explicitly.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub observation_type: Option<ObservationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_observation_id: Option<String>,
}

/// Body of `SCORE_CREATE` events.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub trace_id: String,
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Body of `SDK_LOG` events.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SdkLogBody {
    /// Free-form log payload reported by the SDK.
    pub log: Value,
}

/// A single inbound telemetry event.
///
/// The tagged union over the closed set of event types accepted by the
/// ingestion endpoint. Every variant carries the envelope id (idempotency of
/// the envelope), the client timestamp, and a type-specific body.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum IngestionEvent {
    #[serde(rename = "TRACE_CREATE")]
    TraceCreate {
        id: EventId,
        timestamp: DateTime<Utc>,
        body: TraceBody,
    },
    #[serde(rename = "OBSERVATION_CREATE")]
    ObservationCreate {
        id: EventId,
        timestamp: DateTime<Utc>,
        body: ObservationBody,
    },
    #[serde(rename = "OBSERVATION_UPDATE")]
    ObservationUpdate {
        id: EventId,
        timestamp: DateTime<Utc>,
        body: ObservationBody,
    },
    #[serde(rename = "SPAN_CREATE")]
    SpanCreate {
        id: EventId,
        timestamp: DateTime<Utc>,
        body: ObservationBody,
    },
    #[serde(rename = "SPAN_UPDATE")]
    SpanUpdate {
        id: EventId,
        timestamp: DateTime<Utc>,
        body: ObservationBody,
    },
    #[serde(rename = "GENERATION_CREATE")]
    GenerationCreate {
        id: EventId,
        timestamp: DateTime<Utc>,
        body: ObservationBody,
    },
    #[serde(rename = "GENERATION_UPDATE")]
    GenerationUpdate {
        id: EventId,
        timestamp: DateTime<Utc>,
        body: ObservationBody,
    },
    #[serde(rename = "EVENT_CREATE")]
    EventCreate {
        id: EventId,
        timestamp: DateTime<Utc>,
        body: ObservationBody,
    },
    #[serde(rename = "SCORE_CREATE")]
    ScoreCreate {
        id: EventId,
        timestamp: DateTime<Utc>,
        body: ScoreBody,
    },
    #[serde(rename = "SDK_LOG")]
    SdkLog {
        id: EventId,
        timestamp: DateTime<Utc>,
        body: SdkLogBody,
    },
}

impl IngestionEvent {
    /// Returns the envelope id of this event.
    pub fn event_id(&self) -> &EventId {
        match self {
            Self::TraceCreate { id, .. }
            | Self::ObservationCreate { id, .. }
            | Self::ObservationUpdate { id, .. }
            | Self::SpanCreate { id, .. }
            | Self::SpanUpdate { id, .. }
            | Self::GenerationCreate { id, .. }
            | Self::GenerationUpdate { id, .. }
            | Self::EventCreate { id, .. }
            | Self::ScoreCreate { id, .. }
            | Self::SdkLog { id, .. } => id,
        }
    }

    /// Returns the wire name of the event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TraceCreate { .. } => "TRACE_CREATE",
            Self::ObservationCreate { .. } => "OBSERVATION_CREATE",
            Self::ObservationUpdate { .. } => "OBSERVATION_UPDATE",
            Self::SpanCreate { .. } => "SPAN_CREATE",
            Self::SpanUpdate { .. } => "SPAN_UPDATE",
            Self::GenerationCreate { .. } => "GENERATION_CREATE",
            Self::GenerationUpdate { .. } => "GENERATION_UPDATE",
            Self::EventCreate { .. } => "EVENT_CREATE",
            Self::ScoreCreate { .. } => "SCORE_CREATE",
            Self::SdkLog { .. } => "SDK_LOG",
        }
    }

    /// Whether this event updates an observation created earlier.
    ///
    /// Updates sort after all other events of the same batch, so that a
    /// create and its update submitted together land in order.
    pub fn is_observation_update(&self) -> bool {
        matches!(
            self,
            Self::ObservationUpdate { .. } | Self::SpanUpdate { .. } | Self::GenerationUpdate { .. }
        )
    }

    /// The effective observation type for observation-family events.
    ///
    /// Legacy aliases (`SPAN_*`, `GENERATION_*`, `EVENT_CREATE`) force their
    /// type; `OBSERVATION_*` defaults to the body's `type` field.
    pub fn observation_type(&self) -> Option<ObservationType> {
        match self {
            Self::SpanCreate { .. } | Self::SpanUpdate { .. } => Some(ObservationType::Span),
            Self::GenerationCreate { .. } | Self::GenerationUpdate { .. } => {
                Some(ObservationType::Generation)
            }
            Self::EventCreate { .. } => Some(ObservationType::Event),
            Self::ObservationCreate { body, .. } | Self::ObservationUpdate { body, .. } => {
                body.observation_type
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_trace_create() {
        let event: IngestionEvent = serde_json::from_value(json!({
            "id": "8d4f9a80-31f5-4a4e-8f5b-2f5b2b2b2b2b",
            "type": "TRACE_CREATE",
            "timestamp": "2024-03-01T12:00:00Z",
            "body": {
                "id": "trace-1",
                "name": "chat-completion",
                "userId": "user-7",
                "tags": ["prod"]
            }
        }))
        .unwrap();

        let IngestionEvent::TraceCreate { id, body, .. } = &event else {
            panic!("expected trace create, got {}", event.type_name());
        };
        assert_eq!(id.as_str(), "8d4f9a80-31f5-4a4e-8f5b-2f5b2b2b2b2b");
        assert_eq!(body.id.as_deref(), Some("trace-1"));
        assert_eq!(body.user_id.as_deref(), Some("user-7"));
        assert!(!event.is_observation_update());
    }

    #[test]
    fn parse_rejects_unknown_type() {
        let result: Result<IngestionEvent, _> = serde_json::from_value(json!({
            "id": "x",
            "type": "TRACE_DELETE",
            "timestamp": "2024-03-01T12:00:00Z",
            "body": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn legacy_aliases_fix_observation_type() {
        let event: IngestionEvent = serde_json::from_value(json!({
            "id": "e1",
            "type": "GENERATION_CREATE",
            "timestamp": "2024-03-01T12:00:00Z",
            "body": { "traceId": "trace-1", "model": "gpt-4o" }
        }))
        .unwrap();

        assert_eq!(event.observation_type(), Some(ObservationType::Generation));
        assert!(!event.is_observation_update());

        let update: IngestionEvent = serde_json::from_value(json!({
            "id": "e2",
            "type": "SPAN_UPDATE",
            "timestamp": "2024-03-01T12:00:00Z",
            "body": { "id": "obs-1" }
        }))
        .unwrap();
        assert!(update.is_observation_update());
    }

    #[test]
    fn score_body_requires_trace_and_value() {
        let result: Result<IngestionEvent, _> = serde_json::from_value(json!({
            "id": "s1",
            "type": "SCORE_CREATE",
            "timestamp": "2024-03-01T12:00:00Z",
            "body": { "name": "toxicity" }
        }));
        assert!(result.is_err());
    }
}
