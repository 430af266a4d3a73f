// Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::{transition, JobAction};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job ID (UUID v4 unless supplied by the submitter)
pub type JobId = String;

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Paused,
    Stopping,
    Stopped,
    Killed,
    Deleted,
}

impl JobState {
    pub const ALL: [JobState; 7] = [
        JobState::Pending,
        JobState::Running,
        JobState::Paused,
        JobState::Stopping,
        JobState::Stopped,
        JobState::Killed,
        JobState::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Paused => "PAUSED",
            JobState::Stopping => "STOPPING",
            JobState::Stopped => "STOPPED",
            JobState::Killed => "KILLED",
            JobState::Deleted => "DELETED",
        }
    }

    /// Job has finished executing and may be deleted
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Stopped | JobState::Killed)
    }

    /// No action is accepted any more
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Deleted)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::InvalidState(s.to_string()))
    }
}

/// Job Entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub label: Option<String>,
    pub state: JobState,

    /// Bumped by exactly one per committed transition
    pub version: i64,
    pub last_action: Option<JobAction>,

    pub created_at: i64, // epoch ms
    pub updated_at: i64, // epoch ms
}

impl Job {
    /// Create a new job in `Pending`
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `label` - Optional display name
    pub fn new(id: impl Into<String>, created_at: i64, label: Option<String>) -> Self {
        Self {
            id: id.into(),
            label,
            state: JobState::Pending,
            version: 0,
            last_action: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Build the record that would result from applying `action` at `now_millis`.
    ///
    /// The receiver is left untouched; the caller commits the candidate through
    /// the store's compare-and-swap.
    pub fn transitioned(&self, action: JobAction, now_millis: i64) -> Result<Job> {
        let state = transition::next(self.state, action)?;
        Ok(Job {
            state,
            version: self.version + 1,
            last_action: Some(action),
            updated_at: now_millis,
            ..self.clone()
        })
    }
}

/// One committed transition, kept for audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub job_id: JobId,
    pub version: i64,
    pub from: JobState,
    pub to: JobState,
    pub action: JobAction,
    pub at: i64,
}

impl TransitionRecord {
    pub fn between(before: &Job, after: &Job, action: JobAction) -> Self {
        Self {
            job_id: after.id.clone(),
            version: after.version,
            from: before.state,
            to: after.state,
            action,
            at: after.updated_at,
        }
    }
}
