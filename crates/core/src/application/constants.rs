// Controller constants (no magic values)
use std::time::Duration;

/// How long a control request waits for the job lock by default (5s)
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on a caller-supplied lock timeout (30s)
pub const MAX_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Compare-and-swap attempts before giving up with `Contention`
pub const DEFAULT_MAX_SWAP_ATTEMPTS: u32 = 3;

/// Base backoff between compare-and-swap attempts (5ms)
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 5;

/// Exponential growth of the backoff per attempt
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Page size for job listings
pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

/// Submission limits
pub const MAX_JOB_ID_LEN: usize = 128;
pub const MAX_LABEL_LEN: usize = 200;
