// Lifecycle actions a client may request against a job

use crate::domain::error::DomainError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Action vocabulary of the control surface.
///
/// Wire spelling is lowercase (`action=start` in the form body).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobAction {
    Start,
    Resume,
    Pause,
    Stop,
    Kill,
    Delete,
}

impl JobAction {
    pub const ALL: [JobAction; 6] = [
        JobAction::Start,
        JobAction::Resume,
        JobAction::Pause,
        JobAction::Stop,
        JobAction::Kill,
        JobAction::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Start => "start",
            JobAction::Resume => "resume",
            JobAction::Pause => "pause",
            JobAction::Stop => "stop",
            JobAction::Kill => "kill",
            JobAction::Delete => "delete",
        }
    }
}

impl std::fmt::Display for JobAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(JobAction::Start),
            "resume" => Ok(JobAction::Resume),
            "pause" => Ok(JobAction::Pause),
            "stop" => Ok(JobAction::Stop),
            "kill" => Ok(JobAction::Kill),
            "delete" => Ok(JobAction::Delete),
            other => Err(DomainError::InvalidAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("START".parse::<JobAction>().unwrap(), JobAction::Start);
        assert_eq!(" kill ".parse::<JobAction>().unwrap(), JobAction::Kill);
    }

    #[test]
    fn test_parse_unknown_action() {
        let err = "restart".parse::<JobAction>().unwrap_err();
        assert_eq!(err, DomainError::InvalidAction("restart".to_string()));
    }

    #[test]
    fn test_display_matches_wire_form() {
        for action in JobAction::ALL {
            assert_eq!(action.to_string().parse::<JobAction>().unwrap(), action);
        }
    }
}
