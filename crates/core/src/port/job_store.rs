// Job Store Port (Interface)

use crate::domain::{Job, JobAction, JobId, JobState, TransitionRecord};
use crate::error::{AppError, Result};
use async_trait::async_trait;

/// Outcome of a conditional write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// Candidate stored, transition appended to history
    Committed,
    /// Stored version differs from the expected one
    VersionConflict { current_version: i64 },
    /// No record with this id
    NotFound,
    /// Stored record is `Deleted` and never changes again
    Sealed,
}

/// Persistence interface for job records
///
/// `compare_and_swap` is the only way an existing record changes.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a freshly submitted job. Fails with `Conflict` if the id was ever used.
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn get(&self, id: &JobId) -> Result<Option<Job>>;

    /// Atomically replace the record if its stored version equals `expected_version`.
    ///
    /// Two callers racing with the same expected version: exactly one gets
    /// `Committed`, the other `VersionConflict`.
    async fn compare_and_swap(
        &self,
        id: &JobId,
        expected_version: i64,
        candidate: &Job,
    ) -> Result<SwapOutcome>;

    /// List jobs ordered by creation time, optionally filtered by state
    async fn list(&self, state: Option<JobState>, limit: usize) -> Result<Vec<Job>>;

    /// Committed transitions for a job, oldest first
    async fn history(&self, id: &JobId) -> Result<Vec<TransitionRecord>>;
}

/// Shape checks every store applies before a conditional write.
///
/// Returns the action recorded on the candidate.
pub fn check_candidate(id: &JobId, expected_version: i64, candidate: &Job) -> Result<JobAction> {
    if &candidate.id != id {
        return Err(AppError::Validation(format!(
            "Candidate id {} does not match {}",
            candidate.id, id
        )));
    }
    if candidate.version != expected_version + 1 {
        return Err(AppError::Validation(format!(
            "Candidate version {} must be exactly {} + 1",
            candidate.version, expected_version
        )));
    }
    candidate.last_action.ok_or_else(|| {
        AppError::Validation(format!("Candidate for job {} carries no action", id))
    })
}

// ============================================================================
// In-memory store
// ============================================================================

pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard};

    struct Entry {
        job: Job,
        history: Vec<TransitionRecord>,
    }

    /// HashMap-backed store; records live as long as the process
    #[derive(Default)]
    pub struct InMemoryJobStore {
        entries: Mutex<HashMap<JobId, Entry>>,
    }

    impl InMemoryJobStore {
        pub fn new() -> Self {
            Self::default()
        }

        fn entries(&self) -> MutexGuard<'_, HashMap<JobId, Entry>> {
            // A panic while holding the guard cannot leave a half-written entry
            self.entries.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn insert(&self, job: &Job) -> Result<()> {
            let mut entries = self.entries();
            if entries.contains_key(&job.id) {
                return Err(AppError::Conflict(format!("Job id {} already exists", job.id)));
            }
            entries.insert(
                job.id.clone(),
                Entry {
                    job: job.clone(),
                    history: Vec::new(),
                },
            );
            Ok(())
        }

        async fn get(&self, id: &JobId) -> Result<Option<Job>> {
            Ok(self.entries().get(id).map(|e| e.job.clone()))
        }

        async fn compare_and_swap(
            &self,
            id: &JobId,
            expected_version: i64,
            candidate: &Job,
        ) -> Result<SwapOutcome> {
            let action = check_candidate(id, expected_version, candidate)?;

            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(id) else {
                return Ok(SwapOutcome::NotFound);
            };
            if entry.job.state.is_terminal() {
                return Ok(SwapOutcome::Sealed);
            }
            if entry.job.version != expected_version {
                return Ok(SwapOutcome::VersionConflict {
                    current_version: entry.job.version,
                });
            }

            entry
                .history
                .push(TransitionRecord::between(&entry.job, candidate, action));
            entry.job = candidate.clone();
            Ok(SwapOutcome::Committed)
        }

        async fn list(&self, state: Option<JobState>, limit: usize) -> Result<Vec<Job>> {
            let mut jobs: Vec<Job> = self
                .entries()
                .values()
                .map(|e| e.job.clone())
                .filter(|job| state.map_or(true, |s| job.state == s))
                .collect();
            jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            jobs.truncate(limit);
            Ok(jobs)
        }

        async fn history(&self, id: &JobId) -> Result<Vec<TransitionRecord>> {
            Ok(self
                .entries()
                .get(id)
                .map(|e| e.history.clone())
                .unwrap_or_default())
        }
    }

}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

#[cfg(any(test, feature = "test-util"))]
pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Store whose reads take `delay`, so a caller holds the job lock for that long
    pub struct SlowJobStore {
        inner: Arc<dyn JobStore>,
        delay: Duration,
    }

    impl SlowJobStore {
        pub fn new(inner: Arc<dyn JobStore>, delay: Duration) -> Self {
            Self { inner, delay }
        }
    }

    #[async_trait]
    impl JobStore for SlowJobStore {
        async fn insert(&self, job: &Job) -> Result<()> {
            self.inner.insert(job).await
        }

        async fn get(&self, id: &JobId) -> Result<Option<Job>> {
            tokio::time::sleep(self.delay).await;
            self.inner.get(id).await
        }

        async fn compare_and_swap(
            &self,
            id: &JobId,
            expected_version: i64,
            candidate: &Job,
        ) -> Result<SwapOutcome> {
            self.inner
                .compare_and_swap(id, expected_version, candidate)
                .await
        }

        async fn list(&self, state: Option<JobState>, limit: usize) -> Result<Vec<Job>> {
            self.inner.list(state, limit).await
        }

        async fn history(&self, id: &JobId) -> Result<Vec<TransitionRecord>> {
            self.inner.history(id).await
        }
    }

    /// Store that reports `VersionConflict` for the first `conflicts` swaps,
    /// as if another writer outside this process kept winning.
    pub struct ContendedJobStore {
        inner: Arc<dyn JobStore>,
        remaining: AtomicU32,
        swap_calls: AtomicU32,
    }

    impl ContendedJobStore {
        pub fn new(inner: Arc<dyn JobStore>, conflicts: u32) -> Self {
            Self {
                inner,
                remaining: AtomicU32::new(conflicts),
                swap_calls: AtomicU32::new(0),
            }
        }

        pub fn swap_calls(&self) -> u32 {
            self.swap_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobStore for ContendedJobStore {
        async fn insert(&self, job: &Job) -> Result<()> {
            self.inner.insert(job).await
        }

        async fn get(&self, id: &JobId) -> Result<Option<Job>> {
            self.inner.get(id).await
        }

        async fn compare_and_swap(
            &self,
            id: &JobId,
            expected_version: i64,
            candidate: &Job,
        ) -> Result<SwapOutcome> {
            self.swap_calls.fetch_add(1, Ordering::SeqCst);
            let lose = self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if lose {
                return Ok(SwapOutcome::VersionConflict {
                    current_version: expected_version + 1,
                });
            }
            self.inner
                .compare_and_swap(id, expected_version, candidate)
                .await
        }

        async fn list(&self, state: Option<JobState>, limit: usize) -> Result<Vec<Job>> {
            self.inner.list(state, limit).await
        }

        async fn history(&self, id: &JobId) -> Result<Vec<TransitionRecord>> {
            self.inner.history(id).await
        }
    }

    /// Store whose backend is gone
    pub struct BrokenJobStore;

    #[async_trait]
    impl JobStore for BrokenJobStore {
        async fn insert(&self, _job: &Job) -> Result<()> {
            Err(AppError::Store("disk I/O error".to_string()))
        }

        async fn get(&self, _id: &JobId) -> Result<Option<Job>> {
            Err(AppError::Store("disk I/O error".to_string()))
        }

        async fn compare_and_swap(
            &self,
            _id: &JobId,
            _expected_version: i64,
            _candidate: &Job,
        ) -> Result<SwapOutcome> {
            Err(AppError::Store("disk I/O error".to_string()))
        }

        async fn list(&self, _state: Option<JobState>, _limit: usize) -> Result<Vec<Job>> {
            Err(AppError::Store("disk I/O error".to_string()))
        }

        async fn history(&self, _id: &JobId) -> Result<Vec<TransitionRecord>> {
            Err(AppError::Store("disk I/O error".to_string()))
        }
    }
}
