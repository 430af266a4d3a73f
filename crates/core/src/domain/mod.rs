// Domain Layer - Pure business logic and entities

pub mod action;
pub mod error;
pub mod job;
pub mod transition;

// Re-exports
pub use action::JobAction;
pub use error::DomainError;
pub use job::{Job, JobId, JobState, TransitionRecord};
pub use transition::{allowed_actions, next};
