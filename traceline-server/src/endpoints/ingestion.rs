//! The batch ingestion endpoint.
//!
//! `POST /api/public/ingestion` accepts a JSON envelope `{ batch: [...],
//! metadata? }` of heterogeneous events. Events are validated, scrubbed of
//! NUL characters, persisted idempotently, and answered with a 207
//! multi-status response reporting per-event success or failure. Trace
//! creations additionally fan out to the worker service for evaluation.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};
use traceline_event_schema::{
    scrub_nul, BatchEnvelope, EventId, IngestionEvent, RateLimitResource, TraceUpsertJob,
};

use crate::error::IngestError;
use crate::extractors::Authenticated;
use crate::processors::{ensure_access, processor_for, ProcessedEvent};
use crate::services::{enforce_rate_limit, AuthedRequest, EntityStore, TraceDispatcher};
use crate::statsd::{ServerCounters, ServerHistograms, ServerTimers};
use crate::utils::{retry_with_backoff, RetryConfig};
use crate::ServiceState;

/// One successfully processed event.
#[derive(Debug, Serialize)]
struct ItemSuccess {
    id: EventId,
    status: u16,
}

/// One failed event.
#[derive(Debug, Serialize)]
struct ItemError {
    id: EventId,
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

impl ItemError {
    fn new(id: EventId, error: &IngestError) -> Self {
        Self {
            id,
            status: error.status().as_u16(),
            message: Some(error.to_string()),
            error: Some(error.kind()),
        }
    }
}

/// The 207 multi-status response body.
#[derive(Debug, Default, Serialize)]
pub(crate) struct BatchResponse {
    errors: Vec<ItemError>,
    successes: Vec<ItemSuccess>,
}

/// Handler for the ingestion endpoint.
pub async fn handle(
    State(state): State<ServiceState>,
    Authenticated(authed): Authenticated,
    payload: Result<Json<BatchEnvelope>, JsonRejection>,
) -> Response {
    if let Err(response) =
        enforce_rate_limit(&state, &authed, RateLimitResource::Ingestion).await
    {
        return response;
    }

    // Envelope-level shape failures are a single 400; everything past this
    // point answers 207 with per-event outcomes.
    let Json(envelope) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "message": "Invalid request data",
                    "error": rejection.body_text(),
                })),
            )
                .into_response();
        }
    };

    traceline_statsd::metric!(counter(ServerCounters::BatchReceived) += 1);
    traceline_statsd::metric!(
        histogram(ServerHistograms::BatchSize) = envelope.batch.len() as u64
    );

    let started = std::time::Instant::now();
    let response = process_batch(
        state.entity_store().as_ref(),
        state.dispatcher().as_ref(),
        &authed,
        envelope,
    )
    .await;
    traceline_statsd::metric!(timer(ServerTimers::BatchProcessing) = started.elapsed());

    (StatusCode::MULTI_STATUS, Json(response)).into_response()
}

/// Validates and parses one raw batch element.
///
/// Returns the cleaned event together with its scrubbed JSON. A failure
/// reports the envelope id when one is present, `"unknown"` otherwise.
fn parse_event(raw: Value) -> Result<(IngestionEvent, Value), (EventId, IngestError)> {
    let fallback_id = raw
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(EventId::new)
        .unwrap_or_else(EventId::unknown);

    if let Err(error) = serde_json::from_value::<IngestionEvent>(raw.clone()) {
        return Err((
            fallback_id,
            IngestError::BadRequest(format!("invalid event: {error}")),
        ));
    }

    // Scrub NUL characters and re-validate the cleaned value.
    let cleaned = scrub_nul(raw);
    match serde_json::from_value::<IngestionEvent>(cleaned.clone()) {
        Ok(event) => Ok((event, cleaned)),
        Err(error) => Err((
            fallback_id,
            IngestError::BadRequest(format!("invalid event after cleaning: {error}")),
        )),
    }
}

/// Persists one event: raw audit record first, then the typed entity.
///
/// Infrastructure failures retry with backoff; authentication failures are
/// rejected up front and never reach a second attempt.
async fn process_one(
    store: &dyn EntityStore,
    authed: &AuthedRequest,
    event: &IngestionEvent,
    cleaned: &Value,
    metadata: Option<&Value>,
) -> Result<ProcessedEvent, IngestError> {
    ensure_access(&authed.scope, event)?;

    retry_with_backoff(RetryConfig::default(), IngestError::is_retryable, || async move {
        store
            .insert_raw_event(
                &authed.scope.project_id,
                event.event_id().as_str(),
                event.type_name(),
                cleaned,
                metadata,
            )
            .await?;

        processor_for(event).process(store, &authed.scope).await
    })
    .await
}

/// Processes a parsed envelope into the 207 response.
///
/// Events process sequentially, creates before observation updates, each
/// with its own bounded retry. Partial success is expected; every input
/// event lands in exactly one of the two result arrays.
pub(crate) async fn process_batch(
    store: &dyn EntityStore,
    dispatcher: &dyn TraceDispatcher,
    authed: &AuthedRequest,
    envelope: BatchEnvelope,
) -> BatchResponse {
    let mut response = BatchResponse::default();

    let mut events = Vec::with_capacity(envelope.batch.len());
    for raw in envelope.batch {
        match parse_event(raw) {
            Ok(parsed) => events.push(parsed),
            Err((id, error)) => response.errors.push(ItemError::new(id, &error)),
        }
    }

    // Stable partition: observation updates run after everything else, so a
    // create and its update submitted in one batch land in order.
    let (creates, updates): (Vec<_>, Vec<_>) = events
        .into_iter()
        .partition(|(event, _)| !event.is_observation_update());

    let mut trace_jobs = Vec::new();
    for (event, cleaned) in creates.into_iter().chain(updates) {
        let result = process_one(
            store,
            authed,
            &event,
            &cleaned,
            envelope.metadata.as_ref(),
        )
        .await;

        match result {
            Ok(processed) => {
                traceline_statsd::metric!(
                    counter(ServerCounters::EventProcessed) += 1,
                    event_type = event.type_name(),
                    handling = "success",
                );

                if matches!(event, IngestionEvent::TraceCreate { .. }) {
                    trace_jobs.push(TraceUpsertJob {
                        trace_id: processed.id,
                        project_id: authed.scope.project_id.clone(),
                    });
                }

                response.successes.push(ItemSuccess {
                    id: event.event_id().clone(),
                    status: StatusCode::CREATED.as_u16(),
                });
            }
            Err(error) => {
                traceline_statsd::metric!(
                    counter(ServerCounters::EventProcessed) += 1,
                    event_type = event.type_name(),
                    handling = "failure",
                );

                if error.status() == StatusCode::INTERNAL_SERVER_ERROR {
                    traceline_log::error!(
                        event_id = event.event_id().as_str(),
                        event_type = event.type_name(),
                        "failed to process event: {}",
                        traceline_log::LogError(&error),
                    );
                    traceline_log::capture_error(&error);
                }

                response
                    .errors
                    .push(ItemError::new(event.event_id().clone(), &error));
            }
        }
    }

    // Best effort: the dispatcher logs its own failures and never fails the
    // batch.
    dispatcher.dispatch(trace_jobs).await;

    response
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use traceline_event_schema::{
        AccessLevel, ApiKeyScope, ObservationBody, OrgEnrichedApiKey, OrganizationId, Plan,
        ProjectId, ScoreBody, TraceBody,
    };
    use traceline_store::StoreError;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        RawEvent(String),
        UpsertTrace(String),
        UpsertObservation(String),
        UpdateObservation(String),
        UpsertScore(String),
        InsertSdkLog,
    }

    #[derive(Default)]
    struct MockStore {
        ops: Mutex<Vec<Op>>,
        /// Payloads handed to `insert_raw_event`, keyed by event id.
        raw_payloads: Mutex<Vec<(String, Value)>>,
        /// Observation ids that exist for update events.
        existing_observations: Vec<String>,
        /// Remaining number of times `upsert_trace` fails retryably.
        trace_failures: Mutex<u32>,
    }

    impl MockStore {
        fn ops(&self) -> Vec<Op> {
            self.ops.lock().unwrap().clone()
        }

        fn push(&self, op: Op) {
            self.ops.lock().unwrap().push(op);
        }

        fn db_error() -> StoreError {
            StoreError::Malformed("injected store failure".to_owned())
        }
    }

    #[async_trait]
    impl EntityStore for MockStore {
        async fn insert_raw_event(
            &self,
            _project_id: &ProjectId,
            event_id: &str,
            _event_type: &str,
            payload: &Value,
            _metadata: Option<&Value>,
        ) -> Result<(), StoreError> {
            self.push(Op::RawEvent(event_id.to_owned()));
            self.raw_payloads
                .lock()
                .unwrap()
                .push((event_id.to_owned(), payload.clone()));
            Ok(())
        }

        async fn upsert_trace(
            &self,
            _project_id: &ProjectId,
            _timestamp: DateTime<Utc>,
            body: &TraceBody,
        ) -> Result<String, StoreError> {
            let mut failures = self.trace_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(Self::db_error());
            }
            drop(failures);

            let id = body.id.clone().unwrap_or_else(|| "generated".to_owned());
            self.push(Op::UpsertTrace(id.clone()));
            Ok(id)
        }

        async fn upsert_observation(
            &self,
            _project_id: &ProjectId,
            _observation_type: &str,
            body: &ObservationBody,
        ) -> Result<String, StoreError> {
            let id = body.id.clone().unwrap_or_else(|| "generated".to_owned());
            self.push(Op::UpsertObservation(id.clone()));
            Ok(id)
        }

        async fn update_observation(
            &self,
            _project_id: &ProjectId,
            observation_id: &str,
            _body: &ObservationBody,
        ) -> Result<Option<String>, StoreError> {
            self.push(Op::UpdateObservation(observation_id.to_owned()));
            if self
                .existing_observations
                .iter()
                .any(|id| id == observation_id)
            {
                Ok(Some(observation_id.to_owned()))
            } else {
                Ok(None)
            }
        }

        async fn upsert_score(
            &self,
            _project_id: &ProjectId,
            _timestamp: DateTime<Utc>,
            body: &ScoreBody,
        ) -> Result<String, StoreError> {
            let id = body.id.clone().unwrap_or_else(|| "generated".to_owned());
            self.push(Op::UpsertScore(id.clone()));
            Ok(id)
        }

        async fn insert_sdk_log(
            &self,
            _project_id: &ProjectId,
            _timestamp: DateTime<Utc>,
            _log: &Value,
        ) -> Result<String, StoreError> {
            self.push(Op::InsertSdkLog);
            Ok("log-1".to_owned())
        }
    }

    #[derive(Default)]
    struct MockDispatcher {
        dispatched: Mutex<Vec<Vec<TraceUpsertJob>>>,
    }

    #[async_trait]
    impl TraceDispatcher for MockDispatcher {
        async fn dispatch(&self, jobs: Vec<TraceUpsertJob>) {
            self.dispatched.lock().unwrap().push(jobs);
        }
    }

    fn authed(level: AccessLevel) -> AuthedRequest {
        AuthedRequest {
            scope: ApiKeyScope {
                project_id: ProjectId::new("proj-1"),
                access_level: level,
            },
            api_key: OrgEnrichedApiKey {
                org_id: OrganizationId::new("org-1"),
                plan: Plan::Default,
                rate_limit_overrides: Default::default(),
            },
        }
    }

    fn envelope(batch: Vec<Value>) -> BatchEnvelope {
        BatchEnvelope {
            batch,
            metadata: None,
        }
    }

    fn trace_create(event_id: &str, trace_id: &str) -> Value {
        json!({
            "id": event_id,
            "type": "TRACE_CREATE",
            "timestamp": "2024-03-01T12:00:00Z",
            "body": { "id": trace_id, "name": "run" }
        })
    }

    #[tokio::test]
    async fn mixed_batch_reports_partial_success() {
        let store = MockStore {
            existing_observations: vec!["z".to_owned()],
            ..Default::default()
        };
        let dispatcher = MockDispatcher::default();

        let response = process_batch(
            &store,
            &dispatcher,
            &authed(AccessLevel::All),
            envelope(vec![
                trace_create("a", "trace-a"),
                json!({
                    "id": "b",
                    "type": "OBSERVATION_UPDATE",
                    "timestamp": "2024-03-01T12:00:00Z",
                    "body": { "id": "z" }
                }),
                json!({ "id": "c", "type": "TRACE_CREATE" }),
            ]),
        )
        .await;

        let success_ids: Vec<_> = response.successes.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(success_ids, ["a", "b"]);
        assert!(response.successes.iter().all(|s| s.status == 201));

        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].id.as_str(), "c");
        assert_eq!(response.errors[0].status, 400);

        // Fan-out contains only the successful trace create.
        let dispatched = dispatcher.dispatched.lock().unwrap();
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].len(), 1);
        assert_eq!(dispatched[0][0].trace_id, "trace-a");
    }

    #[tokio::test]
    async fn every_input_lands_in_exactly_one_array() {
        let store = MockStore::default();
        let dispatcher = MockDispatcher::default();

        let batch = vec![
            trace_create("a", "t-1"),
            json!({ "id": "bad-1", "type": "NOPE" }),
            json!({ "totally": "malformed" }),
            trace_create("d", "t-2"),
        ];
        let total = batch.len();

        let response = process_batch(
            &store,
            &dispatcher,
            &authed(AccessLevel::All),
            envelope(batch),
        )
        .await;

        assert_eq!(response.successes.len() + response.errors.len(), total);

        let mut ids: Vec<_> = response
            .successes
            .iter()
            .map(|s| s.id.as_str())
            .chain(response.errors.iter().map(|e| e.id.as_str()))
            .collect();
        ids.sort_unstable();
        assert_eq!(ids, ["a", "bad-1", "d", "unknown"]);
    }

    #[tokio::test]
    async fn observation_updates_process_after_creates() {
        let store = MockStore {
            existing_observations: vec!["obs-1".to_owned()],
            ..Default::default()
        };
        let dispatcher = MockDispatcher::default();

        let response = process_batch(
            &store,
            &dispatcher,
            &authed(AccessLevel::All),
            envelope(vec![
                json!({
                    "id": "u",
                    "type": "OBSERVATION_UPDATE",
                    "timestamp": "2024-03-01T12:00:00Z",
                    "body": { "id": "obs-1" }
                }),
                json!({
                    "id": "c",
                    "type": "OBSERVATION_CREATE",
                    "timestamp": "2024-03-01T12:00:00Z",
                    "body": { "id": "obs-1", "type": "SPAN", "traceId": "t-1" }
                }),
            ]),
        )
        .await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);

        let entity_ops: Vec<_> = store
            .ops()
            .into_iter()
            .filter(|op| !matches!(op, Op::RawEvent(_)))
            .collect();
        assert_eq!(
            entity_ops,
            [
                Op::UpsertObservation("obs-1".to_owned()),
                Op::UpdateObservation("obs-1".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn nul_bytes_are_scrubbed_before_persisting() {
        let store = MockStore::default();
        let dispatcher = MockDispatcher::default();

        let response = process_batch(
            &store,
            &dispatcher,
            &authed(AccessLevel::All),
            envelope(vec![json!({
                "id": "a",
                "type": "TRACE_CREATE",
                "timestamp": "2024-03-01T12:00:00Z",
                "body": { "id": "t-1", "input": { "text": "hi\u{0000}there" } }
            })]),
        )
        .await;

        assert_eq!(response.successes.len(), 1);

        let raw = store.raw_payloads.lock().unwrap();
        let (_, payload) = &raw[0];
        assert_eq!(payload["body"]["input"]["text"], json!("hithere"));
    }

    #[tokio::test]
    async fn transient_store_failures_are_retried() {
        let store = MockStore {
            trace_failures: Mutex::new(2),
            ..Default::default()
        };
        let dispatcher = MockDispatcher::default();

        let response = process_batch(
            &store,
            &dispatcher,
            &authed(AccessLevel::All),
            envelope(vec![trace_create("a", "t-1")]),
        )
        .await;

        // Two failures, third attempt succeeds.
        assert_eq!(response.successes.len(), 1);
        assert_eq!(response.errors.len(), 0);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_500() {
        let store = MockStore {
            trace_failures: Mutex::new(3),
            ..Default::default()
        };
        let dispatcher = MockDispatcher::default();

        let response = process_batch(
            &store,
            &dispatcher,
            &authed(AccessLevel::All),
            envelope(vec![trace_create("a", "t-1")]),
        )
        .await;

        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].status, 500);

        // No fan-out for failed traces.
        let dispatched = dispatcher.dispatched.lock().unwrap();
        assert_eq!(dispatched[0].len(), 0);
    }

    #[tokio::test]
    async fn scores_scope_rejects_non_score_events_without_retry() {
        let store = MockStore::default();
        let dispatcher = MockDispatcher::default();

        let response = process_batch(
            &store,
            &dispatcher,
            &authed(AccessLevel::Scores),
            envelope(vec![
                trace_create("a", "t-1"),
                json!({
                    "id": "s",
                    "type": "SCORE_CREATE",
                    "timestamp": "2024-03-01T12:00:00Z",
                    "body": { "traceId": "t-1", "name": "quality", "value": 0.5 }
                }),
            ]),
        )
        .await;

        assert_eq!(response.successes.len(), 1);
        assert_eq!(response.successes[0].id.as_str(), "s");

        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].id.as_str(), "a");
        assert_eq!(response.errors[0].status, 401);

        // The denied event never reached the store, not even the audit log.
        assert!(store
            .ops()
            .iter()
            .all(|op| !matches!(op, Op::RawEvent(id) | Op::UpsertTrace(id) if id.as_str() == "a")));
    }

    #[tokio::test]
    async fn missing_observation_update_maps_to_404() {
        let store = MockStore::default();
        let dispatcher = MockDispatcher::default();

        let response = process_batch(
            &store,
            &dispatcher,
            &authed(AccessLevel::All),
            envelope(vec![json!({
                "id": "u",
                "type": "OBSERVATION_UPDATE",
                "timestamp": "2024-03-01T12:00:00Z",
                "body": { "id": "missing-obs" }
            })]),
        )
        .await;

        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].status, 404);
        assert_eq!(response.errors[0].error, Some("ResourceNotFound"));
    }

    #[tokio::test]
    async fn empty_batch_answers_empty_arrays() {
        let store = MockStore::default();
        let dispatcher = MockDispatcher::default();

        let response = process_batch(
            &store,
            &dispatcher,
            &authed(AccessLevel::All),
            envelope(vec![]),
        )
        .await;

        assert!(response.successes.is_empty());
        assert!(response.errors.is_empty());
    }

    #[test]
    fn response_serializes_to_documented_shape() {
        let response = BatchResponse {
            errors: vec![ItemError::new(
                EventId::new("c"),
                &IngestError::BadRequest("invalid event".to_owned()),
            )],
            successes: vec![ItemSuccess {
                id: EventId::new("a"),
                status: 201,
            }],
        };

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "errors": [
                    { "id": "c", "status": 400, "message": "invalid event", "error": "BadRequest" }
                ],
                "successes": [
                    { "id": "a", "status": 201 }
                ]
            })
        );
    }
}
