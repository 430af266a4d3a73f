// Central Error Type for the Application

use crate::domain::{DomainError, JobAction, JobId, JobState};
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Job {job_id} is contended: version kept moving after {attempts} attempts")]
    Contention { job_id: JobId, attempts: u32 },

    #[error("Job {job_id} is busy: lock not acquired within {waited_ms}ms")]
    Busy { job_id: JobId, waited_ms: u64 },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl AppError {
    pub fn illegal_transition(from: JobState, action: JobAction) -> Self {
        AppError::Domain(DomainError::IllegalTransition { from, action })
    }

    /// The caller may resubmit the same request and expect a different outcome
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Contention { .. } | AppError::Busy { .. })
    }

    /// Short machine-readable kind, stable across message wording changes
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::IllegalTransition { .. }) => "illegal_transition",
            AppError::Domain(DomainError::InvalidAction(_)) => "invalid_action",
            AppError::Domain(_) | AppError::Validation(_) => "validation",
            AppError::JobNotFound(_) => "job_not_found",
            AppError::Contention { .. } => "contention",
            AppError::Busy { .. } => "busy",
            AppError::Store(_) => "store_failure",
            AppError::Conflict(_) => "conflict",
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
