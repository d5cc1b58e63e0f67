use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProjectId;

/// Queue payload emitted for every upserted trace.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceUpsertJob {
    pub trace_id: String,
    pub project_id: ProjectId,
}

/// Queue payload for one evaluation job execution.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvalExecutionJob {
    pub job_execution_id: Uuid,
    pub project_id: ProjectId,
}

/// Lifecycle status of a persisted job execution.
///
/// The status moves monotonically toward a terminal state; `Error` may only
/// overwrite non-terminal states.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobExecutionStatus {
    Pending,
    Completed,
    Error,
    Cancelled,
}

impl JobExecutionStatus {
    /// Returns the database representation of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Error => "ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Cancelled)
    }
}
