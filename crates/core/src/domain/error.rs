// Domain Error Types

use crate::domain::{JobAction, JobState};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Illegal transition: cannot {action} a job in state {from}")]
    IllegalTransition { from: JobState, action: JobAction },

    #[error("Unknown action: {0}")]
    InvalidAction(String),

    #[error("Unknown job state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
