use axum::http::StatusCode;
use thiserror::Error;
use traceline_store::StoreError;

/// The error taxonomy of per-event ingestion.
///
/// Each variant maps to a per-item status in the 207 batch response. Only
/// infrastructure failures are retryable; client errors are final on the
/// first attempt.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The event failed schema or shape validation.
    #[error("{0}")]
    BadRequest(String),

    /// Authentication or scope violation.
    #[error("{0}")]
    Authentication(String),

    /// A referenced entity does not exist in the project.
    #[error("{0}")]
    NotFound(String),

    /// A database operation failed.
    #[error(transparent)]
    Db(#[from] StoreError),

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl IngestError {
    /// The per-item HTTP status reported in the batch response.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Db(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The error kind name reported in the batch response.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BadRequest",
            Self::Authentication(_) => "Authentication",
            Self::NotFound(_) => "ResourceNotFound",
            Self::Db(_) => "DBError",
            Self::Internal(_) => "Internal",
        }
    }

    /// Whether the per-event retry loop should try this again.
    ///
    /// Authentication failures in particular must not be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Db(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            IngestError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            IngestError::Authentication("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            IngestError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            IngestError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn only_infrastructure_errors_retry() {
        assert!(!IngestError::BadRequest("x".into()).is_retryable());
        assert!(!IngestError::Authentication("x".into()).is_retryable());
        assert!(!IngestError::NotFound("x".into()).is_retryable());
        assert!(IngestError::Internal("x".into()).is_retryable());
    }
}
