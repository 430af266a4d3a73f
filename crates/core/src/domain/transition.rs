// Transition Validator
//
// Legality table for lifecycle actions. Pure: no I/O, no clock.

use crate::domain::error::{DomainError, Result};
use crate::domain::{JobAction, JobState};

/// Resolve the state reached by applying `action` in `state`.
///
/// `kill` overrides every live state, including an in-progress graceful stop.
/// `stop` while already `Stopping` is rejected so the executor never sees a
/// second terminate signal. `delete` is only accepted once the job finished.
pub fn next(state: JobState, action: JobAction) -> Result<JobState> {
    use JobAction::*;
    use JobState::*;

    let target = match (state, action) {
        (Pending, Start) => Some(Running),
        (Pending, Stop) => Some(Stopped),
        (Pending, Kill) => Some(Killed),

        (Running, Pause) => Some(Paused),
        (Running, Stop) => Some(Stopping),
        (Running, Kill) => Some(Killed),

        (Paused, Resume) => Some(Running),
        (Paused, Stop) => Some(Stopping),
        (Paused, Kill) => Some(Killed),

        (Stopping, Kill) => Some(Killed),

        (Stopped, Delete) | (Killed, Delete) => Some(Deleted),

        _ => None,
    };

    target.ok_or(DomainError::IllegalTransition {
        from: state,
        action,
    })
}

/// Actions accepted in `state`, in display order
pub fn allowed_actions(state: JobState) -> Vec<JobAction> {
    JobAction::ALL
        .into_iter()
        .filter(|action| next(state, *action).is_ok())
        .collect()
}
