// Application Layer - Use Cases

pub mod constants;
pub mod controller;
pub mod lock;
pub mod retry;
pub mod shutdown;
pub mod submit;

// Re-exports
pub use controller::{Applied, ControlWarning, ControllerConfig, JobController};
pub use lock::{JobLockGuard, JobLocks};
pub use retry::{RetryDecision, RetryPolicy};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
pub use submit::{SubmitRequest, SubmitService};
