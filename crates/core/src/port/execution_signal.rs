// Execution Signal Port
// Tells the job runner that a committed transition demands an effect

use crate::domain::{Job, JobAction, JobId, JobState};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What the executor is expected to do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEffect {
    Begin,
    Resume,
    Suspend,
    /// Graceful stop; the executor finishes in-flight work
    Terminate,
    Kill,
    /// Free anything still held for a deleted job
    Release,
}

impl ExecutionEffect {
    pub fn for_action(action: JobAction) -> Self {
        match action {
            JobAction::Start => ExecutionEffect::Begin,
            JobAction::Resume => ExecutionEffect::Resume,
            JobAction::Pause => ExecutionEffect::Suspend,
            JobAction::Stop => ExecutionEffect::Terminate,
            JobAction::Kill => ExecutionEffect::Kill,
            JobAction::Delete => ExecutionEffect::Release,
        }
    }
}

/// Notification sent once per committed transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    pub job_id: JobId,
    pub action: JobAction,
    pub state: JobState,
    pub version: i64,
    pub effect: ExecutionEffect,
}

impl Signal {
    pub fn for_commit(job: &Job, action: JobAction) -> Self {
        Self {
            job_id: job.id.clone(),
            action,
            state: job.state,
            version: job.version,
            effect: ExecutionEffect::for_action(action),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    #[error("Signal queue full ({0} pending)")]
    QueueFull(usize),

    #[error("Signal channel disconnected")]
    Disconnected,

    #[error("Signal delivery failed: {0}")]
    Delivery(String),
}

/// Execution signal channel
///
/// Implementations must hand the signal off without waiting for the executor
/// to act on it: the controller calls `notify` while still holding the job lock.
#[async_trait]
pub trait ExecutionSignal: Send + Sync {
    async fn notify(&self, signal: Signal) -> Result<(), SignalError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

#[cfg(any(test, feature = "test-util"))]
pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records every signal; optionally fails each notify after recording it
    #[derive(Default)]
    pub struct RecordingSignal {
        signals: Mutex<Vec<Signal>>,
        failure: Option<SignalError>,
    }

    impl RecordingSignal {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(error: SignalError) -> Self {
            Self {
                signals: Mutex::new(Vec::new()),
                failure: Some(error),
            }
        }

        pub fn signals(&self) -> Vec<Signal> {
            self.signals.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[async_trait]
    impl ExecutionSignal for RecordingSignal {
        async fn notify(&self, signal: Signal) -> Result<(), SignalError> {
            self.signals.lock().unwrap_or_else(|e| e.into_inner()).push(signal);
            match &self.failure {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }
}
