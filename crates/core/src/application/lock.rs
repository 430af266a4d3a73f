// Per-job lock registry
//
// One async mutex per job id, created on demand and dropped once nobody holds
// or waits for it. Locks for different ids never interact.

use crate::domain::JobId;
use crate::error::{AppError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type Slot = Arc<AsyncMutex<()>>;

#[derive(Clone, Default)]
pub struct JobLocks {
    slots: Arc<Mutex<HashMap<JobId, Slot>>>,
}

impl JobLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for exclusive access to `job_id`.
    ///
    /// Waiters are served in arrival order (tokio's mutex is fair). On timeout
    /// the request gives up with `Busy` instead of queueing indefinitely.
    pub async fn acquire(&self, job_id: &JobId, timeout: Duration) -> Result<JobLockGuard> {
        let slot = self.slots().entry(job_id.clone()).or_default().clone();

        let acquired = tokio::time::timeout(timeout, Arc::clone(&slot).lock_owned()).await;
        drop(slot);

        match acquired {
            Ok(guard) => Ok(JobLockGuard {
                job_id: job_id.clone(),
                guard: Some(guard),
                locks: self.clone(),
            }),
            Err(_) => {
                self.prune(job_id);
                debug!(job_id = %job_id, timeout_ms = timeout.as_millis() as u64, "Job lock wait timed out");
                Err(AppError::Busy {
                    job_id: job_id.clone(),
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Number of ids with a live lock (held or awaited)
    pub fn tracked(&self) -> usize {
        self.slots().len()
    }

    fn prune(&self, job_id: &JobId) {
        let mut slots = self.slots();
        if let Some(slot) = slots.get(job_id) {
            // Only the registry's own reference is left
            if Arc::strong_count(slot) == 1 {
                slots.remove(job_id);
            }
        }
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<JobId, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Exclusive access to one job; released on drop
pub struct JobLockGuard {
    job_id: JobId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: JobLocks,
}

impl JobLockGuard {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

impl Drop for JobLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.prune(&self.job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_acquire_times_out_while_held() {
        let locks = JobLocks::new();
        let id: JobId = "job-1".into();

        let _held = locks.acquire(&id, Duration::from_millis(50)).await.unwrap();
        let err = locks
            .acquire(&id, Duration::from_millis(20))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, AppError::Busy { waited_ms: 20, .. }));
    }

    #[tokio::test]
    async fn test_different_jobs_do_not_block_each_other() {
        let locks = JobLocks::new();
        let _a = locks
            .acquire(&"a".to_string(), Duration::from_millis(10))
            .await
            .unwrap();
        let _b = locks
            .acquire(&"b".to_string(), Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn test_released_lock_is_pruned() {
        let locks = JobLocks::new();
        let id: JobId = "job-1".into();

        {
            let guard = locks.acquire(&id, Duration::from_millis(10)).await.unwrap();
            assert_eq!(guard.job_id(), "job-1");
            assert_eq!(locks.tracked(), 1);
        }
        assert_eq!(locks.tracked(), 0);

        // Timed-out waiters leave nothing behind either
        let held = locks.acquire(&id, Duration::from_millis(10)).await.unwrap();
        assert!(locks.acquire(&id, Duration::from_millis(5)).await.is_err());
        drop(held);
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let locks = JobLocks::new();
        let id: JobId = "job-1".into();

        let held = locks.acquire(&id, Duration::from_millis(10)).await.unwrap();
        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move { locks.acquire(&id, Duration::from_secs(1)).await.is_ok() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert!(waiter.await.unwrap());
    }
}
