use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// An API key joined with its organization's billing state.
#[derive(Clone, Debug, FromRow)]
pub struct ApiKeyRow {
    pub public_key: String,
    /// SHA-256 hex digest of the secret key.
    pub hashed_secret_key: String,
    pub project_id: String,
    /// `all` or `scores`.
    pub scope: String,
    pub org_id: String,
    pub plan: String,
    /// JSON array of per-resource budget overrides, if any.
    pub rate_limit_overrides: Option<Value>,
}

/// An active evaluation rule configured for a project.
#[derive(Clone, Debug, FromRow)]
pub struct JobConfigurationRow {
    pub id: Uuid,
    pub project_id: String,
    /// JSON array of filter conditions a trace must match.
    pub filter: Option<Value>,
    /// Fraction of matching traces admitted, in `0.0..=1.0`.
    pub sampling: f64,
    /// Delay before execution, in milliseconds.
    pub delay_ms: i64,
    /// Name under which the produced score is recorded.
    pub score_name: String,
    /// Evaluation prompt with `{{variable}}` placeholders.
    pub template: String,
    /// Maps template variables to trace columns.
    pub variable_mapping: Option<Value>,
    /// LLM provider identifier, e.g. `openai`.
    pub provider: String,
    /// Model requested from the provider.
    pub model: String,
}

/// A job execution joined with its configuration, as the executor loads it.
#[derive(Clone, Debug, FromRow)]
pub struct JobExecutionRow {
    pub id: Uuid,
    pub project_id: String,
    pub trace_id: String,
    pub status: String,
    pub score_name: String,
    pub template: String,
    pub variable_mapping: Option<Value>,
    pub provider: String,
    pub model: String,
}

/// The trace columns exposed to evaluation variable mapping.
#[derive(Clone, Debug, FromRow)]
pub struct TraceRow {
    pub id: String,
    pub name: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub metadata: Option<Value>,
    pub tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
