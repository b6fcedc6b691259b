//! Conversion job state and error taxonomy

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::artifacts::{Artifact, StorageError};
use crate::engine::UnknownTool;
use crate::upload::ValidationError;

/// Lifecycle of a conversion job
///
/// `Pending → Running → Succeeded | Failed`. No retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }
}

/// One request's conversion
#[derive(Debug, Clone, Serialize)]
pub struct ConversionJob {
    pub id: Uuid,
    pub tool: &'static str,
    pub file_count: usize,
    state: JobState,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ConversionJob {
    pub fn new(tool: &'static str, file_count: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool,
            file_count,
            state: JobState::Pending,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn start(&mut self) -> Result<(), JobError> {
        self.transition(JobState::Pending, JobState::Running)
    }

    pub fn succeed(&mut self) -> Result<(), JobError> {
        self.transition(JobState::Running, JobState::Succeeded)
    }

    pub fn fail(&mut self) -> Result<(), JobError> {
        self.transition(JobState::Running, JobState::Failed)
    }

    fn transition(&mut self, from: JobState, to: JobState) -> Result<(), JobError> {
        if self.state != from {
            return Err(JobError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// A successful job's result
#[derive(Debug, Clone)]
pub struct CompletedJob {
    pub job: ConversionJob,
    pub artifact: Artifact,
}

/// Every way a conversion request can fail
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    UnknownTool(#[from] UnknownTool),

    /// Engine failure, message already free of filesystem paths
    #[error("{0}")]
    Engine(String),

    #[error("{0}")]
    EngineUnavailable(String),

    #[error("Conversion timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid job state transition from {from:?} to {to:?}")]
    InvalidTransition { from: JobState, to: JobState },
}

impl JobError {
    /// Taxonomy name reported to clients
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Validation(_) => "ValidationError",
            JobError::UnknownTool(_) => "UnknownTool",
            JobError::Engine(_) => "ConversionEngineError",
            JobError::EngineUnavailable(_) => "EngineUnavailable",
            JobError::Timeout { .. } => "Timeout",
            JobError::Storage(_) => "StorageError",
            JobError::InvalidTransition { .. } => "InternalError",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            JobError::Validation(_) => StatusCode::BAD_REQUEST,
            JobError::UnknownTool(_) => StatusCode::NOT_FOUND,
            JobError::Engine(_) => StatusCode::UNPROCESSABLE_ENTITY,
            JobError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            JobError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            JobError::Storage(_) | JobError::InvalidTransition { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
