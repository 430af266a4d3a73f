// Retry logic for transient failures (version races, signal delivery)
use crate::application::constants::DEFAULT_BACKOFF_FACTOR;
use std::time::Duration;
use tracing::debug;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the given delay
    Retry(Duration),
    /// Attempt budget spent
    GiveUp,
}

/// Bounded exponential backoff
///
/// delay = base_delay * (backoff_factor ^ (attempt - 1)) * jitter
///
/// Jitter is ±10% and derived from a caller key (the job id), so the same
/// job always backs off the same way while different jobs spread out.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay_ms: i64,
    backoff_factor: f64,
    max_attempts: u32,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `base_delay_ms` - Delay before the second attempt
    /// * `max_attempts` - Total attempts, including the first one (at least 1)
    pub fn new(base_delay_ms: i64, max_attempts: u32) -> Self {
        Self {
            base_delay_ms: base_delay_ms.max(0),
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what to do after `attempts_made` failed attempts.
    ///
    /// # Example
    /// ```text
    /// let policy = RetryPolicy::new(5, 3);
    /// match policy.should_retry(1, "job-1") {
    ///     RetryDecision::Retry(delay) => tokio::time::sleep(delay).await,
    ///     RetryDecision::GiveUp => return Err(..),
    /// }
    /// ```
    pub fn should_retry(&self, attempts_made: u32, key: &str) -> RetryDecision {
        if attempts_made >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        let exponent = attempts_made.saturating_sub(1) as i32;
        let base = self.base_delay_ms as f64 * self.backoff_factor.powi(exponent);

        let jitter_seed = key.chars().map(|c| c as u32).fold(0u32, u32::wrapping_add);
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        let delay_ms = (base * jitter_factor) as u64;
        debug!(key, attempts_made, delay_ms, "Scheduling retry");

        RetryDecision::Retry(Duration::from_millis(delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gives_up_after_budget() {
        let policy = RetryPolicy::new(10, 3);
        assert!(matches!(policy.should_retry(1, "job"), RetryDecision::Retry(_)));
        assert!(matches!(policy.should_retry(2, "job"), RetryDecision::Retry(_)));
        assert_eq!(policy.should_retry(3, "job"), RetryDecision::GiveUp);
    }

    #[test]
    fn test_backoff_grows_within_jitter_bounds() {
        let policy = RetryPolicy::new(100, 5);
        let RetryDecision::Retry(first) = policy.should_retry(1, "job-7") else {
            panic!("expected retry");
        };
        let RetryDecision::Retry(third) = policy.should_retry(3, "job-7") else {
            panic!("expected retry");
        };

        assert!(first >= Duration::from_millis(90) && first <= Duration::from_millis(110));
        assert!(third >= Duration::from_millis(360) && third <= Duration::from_millis(440));
    }

    #[test]
    fn test_jitter_is_deterministic_per_key() {
        let policy = RetryPolicy::new(100, 5);
        assert_eq!(policy.should_retry(2, "abc"), policy.should_retry(2, "abc"));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = RetryPolicy::new(100, 0);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.should_retry(1, "job"), RetryDecision::GiveUp);
    }
}
