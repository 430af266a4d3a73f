// jobctl Infrastructure - Execution Signal Adapters
// Implements: ExecutionSignal (bounded queue) plus sinks that reach the job runner

pub mod queue;
pub mod sink;

pub use queue::{signal_channel, QueuedSignalChannel, SignalDispatcher};
pub use sink::{SignalSink, TracingSink, WebhookSink};

/// Pending signals held before `notify` starts failing with `QueueFull`
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Delivery attempts per signal, including the first
pub const DEFAULT_DELIVERY_ATTEMPTS: u32 = 5;

/// Base backoff between delivery attempts (200ms)
pub const DEFAULT_DELIVERY_BASE_DELAY_MS: i64 = 200;
