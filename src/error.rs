//! Error types for the Doc Converter server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::artifacts::StorageError;
use crate::engine::UnknownTool;
use crate::jobs::JobError;
use crate::upload::ValidationError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Job(#[from] JobError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        AppError::Job(JobError::Storage(e))
    }
}

impl From<UnknownTool> for AppError {
    fn from(e: UnknownTool) -> Self {
        AppError::Job(JobError::UnknownTool(e))
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::Job(JobError::Validation(e))
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
    /// Which validation rule failed, e.g. `FileTooLarge`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BadRequest",
            AppError::Job(e) => e.kind(),
            AppError::Internal(_) => "InternalError",
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            AppError::Job(JobError::Validation(e)) => Some(e.kind()),
            _ => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Job(e) => e.status_code(),
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let kind = self.kind();
        let reason = self.reason();

        let message = match &self {
            AppError::Job(JobError::Storage(e)) => {
                tracing::error!("Storage error: {}", e);
                "Storage error".to_string()
            }
            AppError::Job(e @ JobError::InvalidTransition { .. }) => {
                tracing::error!("Job error: {}", e);
                "An internal error occurred".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: message,
            kind,
            reason,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_validation_message_is_verbatim() {
        let err = AppError::from(ValidationError::EmptyUpload);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "ValidationError");
        assert_eq!(err.to_string(), ValidationError::EmptyUpload.to_string());
        assert_eq!(err.reason(), Some("EmptyUpload"));
    }

    #[test]
    fn test_reason_only_for_validation_errors() {
        let err = AppError::from(ValidationError::TooManyFiles { count: 11, max: 10 });
        assert_eq!(err.reason(), Some("TooManyFiles"));

        assert_eq!(AppError::BadRequest("bad".into()).reason(), None);
        assert_eq!(AppError::Job(JobError::Timeout { secs: 60 }).reason(), None);
    }

    #[test]
    fn test_storage_error_is_opaque() {
        let response =
            AppError::from(StorageError::UnknownJob(Uuid::new_v4())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_bad_request() {
        let err = AppError::BadRequest("Missing file 2".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Missing file 2");
    }
}
