// Port Layer - Interfaces for external dependencies

pub mod execution_signal;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod time_provider;

// Re-exports
pub use execution_signal::{ExecutionEffect, ExecutionSignal, Signal, SignalError};
pub use id_provider::IdProvider;
pub use job_store::{JobStore, SwapOutcome};
pub use time_provider::TimeProvider;
