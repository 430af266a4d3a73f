// Job Controller - applies lifecycle actions end-to-end
//
// lock -> load -> validate -> compare-and-swap -> notify executor -> unlock

use crate::application::constants::*;
use crate::application::lock::JobLocks;
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{Job, JobAction, JobId, JobState, TransitionRecord};
use crate::error::{AppError, Result};
use crate::port::{ExecutionSignal, JobStore, Signal, SwapOutcome, TimeProvider};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Controller tuning
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Lock wait used when the caller does not pass one
    pub lock_timeout: Duration,
    /// Caller-supplied timeouts are capped here
    pub max_lock_timeout: Duration,
    /// Total compare-and-swap attempts per request
    pub max_swap_attempts: u32,
    pub retry_base_delay_ms: i64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_lock_timeout: MAX_LOCK_TIMEOUT,
            max_swap_attempts: DEFAULT_MAX_SWAP_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
        }
    }
}

/// Non-fatal problem attached to a committed transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlWarning {
    /// The executor was not told about the transition; it stays committed
    ExecutionSignalFailed { job_id: JobId, reason: String },
}

impl std::fmt::Display for ControlWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlWarning::ExecutionSignalFailed { job_id, reason } => {
                write!(f, "execution signal for job {} failed: {}", job_id, reason)
            }
        }
    }
}

/// Result of a successful `apply`
#[derive(Debug, Clone, Serialize)]
pub struct Applied {
    pub job: Job,
    pub warning: Option<ControlWarning>,
}

pub struct JobController {
    store: Arc<dyn JobStore>,
    signal: Arc<dyn ExecutionSignal>,
    time_provider: Arc<dyn TimeProvider>,
    locks: JobLocks,
    retry: RetryPolicy,
    config: ControllerConfig,
}

impl JobController {
    pub fn new(
        store: Arc<dyn JobStore>,
        signal: Arc<dyn ExecutionSignal>,
        time_provider: Arc<dyn TimeProvider>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            signal,
            time_provider,
            locks: JobLocks::new(),
            retry: RetryPolicy::new(config.retry_base_delay_ms, config.max_swap_attempts),
            config,
        }
    }

    /// Apply `action` to job `id` with the configured lock timeout
    pub async fn apply(&self, id: &JobId, action: JobAction) -> Result<Applied> {
        self.apply_with_timeout(id, action, self.config.lock_timeout)
            .await
    }

    /// Retire a finished job. The record is kept, sealed, for audit.
    pub async fn delete(&self, id: &JobId) -> Result<Applied> {
        self.apply(id, JobAction::Delete).await
    }

    /// Apply `action`, waiting at most `timeout` for the job lock.
    ///
    /// # Errors
    /// - `Busy` if the lock was not acquired in time
    /// - `JobNotFound` if no record exists
    /// - `Domain(IllegalTransition)` if the action is not legal in the current state
    /// - `Contention` if the version kept moving for every attempt
    /// - `Store` if the backend failed
    pub async fn apply_with_timeout(
        &self,
        id: &JobId,
        action: JobAction,
        timeout: Duration,
    ) -> Result<Applied> {
        let timeout = timeout.min(self.config.max_lock_timeout);
        let _guard = self.locks.acquire(id, timeout).await?;

        let job = self.commit(id, action).await?;
        let warning = self.notify(&job, action).await;

        Ok(Applied { job, warning })
    }

    async fn commit(&self, id: &JobId, action: JobAction) -> Result<Job> {
        let mut attempts = 0;
        loop {
            attempts += 1;

            let current = self
                .store
                .get(id)
                .await
                .map_err(|e| store_failure(id, action, e))?
                .ok_or_else(|| AppError::JobNotFound(id.clone()))?;

            let candidate = match current.transitioned(action, self.time_provider.now_millis()) {
                Ok(candidate) => candidate,
                Err(e) => {
                    debug!(job_id = %id, action = %action, state = %current.state, "Transition rejected");
                    return Err(e.into());
                }
            };

            let outcome = self
                .store
                .compare_and_swap(id, current.version, &candidate)
                .await
                .map_err(|e| store_failure(id, action, e))?;

            match outcome {
                SwapOutcome::Committed => {
                    info!(
                        job_id = %id,
                        action = %action,
                        from = %current.state,
                        to = %candidate.state,
                        version = candidate.version,
                        "Transition committed"
                    );
                    return Ok(candidate);
                }
                SwapOutcome::NotFound => return Err(AppError::JobNotFound(id.clone())),
                SwapOutcome::Sealed => {
                    return Err(AppError::illegal_transition(JobState::Deleted, action))
                }
                SwapOutcome::VersionConflict { current_version } => {
                    match self.retry.should_retry(attempts, id) {
                        RetryDecision::Retry(delay) => {
                            warn!(
                                job_id = %id,
                                expected_version = current.version,
                                current_version,
                                attempts,
                                "Version conflict, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::GiveUp => {
                            warn!(job_id = %id, attempts, "Giving up after repeated version conflicts");
                            return Err(AppError::Contention {
                                job_id: id.clone(),
                                attempts,
                            });
                        }
                    }
                }
            }
        }
    }

    async fn notify(&self, job: &Job, action: JobAction) -> Option<ControlWarning> {
        match self.signal.notify(Signal::for_commit(job, action)).await {
            Ok(()) => None,
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    state = %job.state,
                    version = job.version,
                    error = %e,
                    "Execution signal failed; transition stays committed"
                );
                Some(ControlWarning::ExecutionSignalFailed {
                    job_id: job.id.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Read the current record
    pub async fn get(&self, id: &JobId) -> Result<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| AppError::JobNotFound(id.clone()))
    }

    /// List jobs, capped at `MAX_LIST_LIMIT`
    pub async fn list(&self, state: Option<JobState>, limit: usize) -> Result<Vec<Job>> {
        self.store.list(state, limit.min(MAX_LIST_LIMIT)).await
    }

    /// Committed transitions of an existing job
    pub async fn history(&self, id: &JobId) -> Result<Vec<TransitionRecord>> {
        self.get(id).await?;
        self.store.history(id).await
    }
}

fn store_failure(id: &JobId, action: JobAction, err: AppError) -> AppError {
    if matches!(err, AppError::Store(_)) {
        error!(job_id = %id, action = %action, error = %err, "Job store failure");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::execution_signal::mocks::RecordingSignal;
    use crate::port::job_store::memory::InMemoryJobStore;
    use crate::port::job_store::mocks::{BrokenJobStore, ContendedJobStore, SlowJobStore};
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::{ExecutionEffect, SignalError};
    use crate::domain::DomainError;

    struct Harness {
        store: Arc<InMemoryJobStore>,
        signal: Arc<RecordingSignal>,
        controller: Arc<JobController>,
    }

    fn harness_with(signal: RecordingSignal) -> Harness {
        let store = Arc::new(InMemoryJobStore::new());
        let signal = Arc::new(signal);
        let controller = Arc::new(JobController::new(
            store.clone(),
            signal.clone(),
            Arc::new(ManualTimeProvider::new(10_000)),
            ControllerConfig::default(),
        ));
        Harness {
            store,
            signal,
            controller,
        }
    }

    fn harness() -> Harness {
        harness_with(RecordingSignal::new())
    }

    /// Insert a job and drive it into `state` through legal actions
    async fn seed(h: &Harness, id: &str, state: JobState) -> Job {
        h.store.insert(&Job::new(id, 1000, None)).await.unwrap();
        let path: &[JobAction] = match state {
            JobState::Pending => &[],
            JobState::Running => &[JobAction::Start],
            JobState::Paused => &[JobAction::Start, JobAction::Pause],
            JobState::Stopping => &[JobAction::Start, JobAction::Stop],
            JobState::Stopped => &[JobAction::Stop],
            JobState::Killed => &[JobAction::Kill],
            JobState::Deleted => &[JobAction::Kill, JobAction::Delete],
        };
        for action in path {
            h.controller.apply(&id.to_string(), *action).await.unwrap();
        }
        h.controller.get(&id.to_string()).await.unwrap()
    }

    #[tokio::test]
    async fn test_every_pair_follows_table() {
        for state in JobState::ALL {
            for action in JobAction::ALL {
                let h = harness();
                let id = format!("{}-{}", state, action);
                let before = seed(&h, &id, state).await;

                let result = h.controller.apply(&id, action).await;
                let after = h.controller.get(&id).await.unwrap();

                match crate::domain::next(state, action) {
                    Ok(target) => {
                        let applied = result.unwrap();
                        assert_eq!(applied.job.state, target);
                        assert_eq!(applied.job.version, before.version + 1);
                        assert_eq!(after, applied.job);
                    }
                    Err(_) => {
                        assert!(matches!(
                            result,
                            Err(AppError::Domain(DomainError::IllegalTransition { from, action: a }))
                                if from == state && a == action
                        ));
                        assert_eq!(after, before, "{state} + {action} must not change the record");
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_lifecycle_scenario() {
        let h = harness();
        let id: JobId = "job-1".into();
        seed(&h, &id, JobState::Pending).await;

        let steps = [
            (JobAction::Start, JobState::Running, 1),
            (JobAction::Pause, JobState::Paused, 2),
            (JobAction::Stop, JobState::Stopping, 3),
            (JobAction::Kill, JobState::Killed, 4),
            (JobAction::Delete, JobState::Deleted, 5),
        ];
        for (action, state, version) in steps {
            let applied = h.controller.apply(&id, action).await.unwrap();
            assert_eq!(applied.job.state, state);
            assert_eq!(applied.job.version, version);
            assert_eq!(applied.job.last_action, Some(action));
            assert!(applied.warning.is_none());
        }

        let err = h.controller.apply(&id, JobAction::Start).await.unwrap_err();
        assert_eq!(err.kind(), "illegal_transition");

        let history = h.controller.history(&id).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[2].from, JobState::Paused);
        assert_eq!(history[2].to, JobState::Stopping);

        let effects: Vec<ExecutionEffect> = h.signal.signals().iter().map(|s| s.effect).collect();
        assert_eq!(
            effects,
            vec![
                ExecutionEffect::Begin,
                ExecutionEffect::Suspend,
                ExecutionEffect::Terminate,
                ExecutionEffect::Kill,
                ExecutionEffect::Release,
            ]
        );
    }

    #[tokio::test]
    async fn test_stopped_job_rejects_pause() {
        let h = harness();
        let before = seed(&h, "job-1", JobState::Stopped).await;

        let err = h
            .controller
            .apply(&before.id, JobAction::Pause)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::IllegalTransition {
                from: JobState::Stopped,
                action: JobAction::Pause
            })
        ));
        assert_eq!(h.controller.get(&before.id).await.unwrap().version, before.version);
    }

    #[tokio::test]
    async fn test_delete_twice() {
        let h = harness();
        let job = seed(&h, "job-1", JobState::Killed).await;

        let applied = h.controller.delete(&job.id).await.unwrap();
        assert_eq!(applied.job.state, JobState::Deleted);

        let err = h.controller.delete(&job.id).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Domain(DomainError::IllegalTransition {
                from: JobState::Deleted,
                action: JobAction::Delete
            })
        ));
        // Retained for audit
        assert_eq!(h.controller.get(&job.id).await.unwrap().state, JobState::Deleted);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let h = harness();
        let err = h
            .controller
            .apply(&"nope".to_string(), JobAction::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::JobNotFound(id) if id == "nope"));
        assert!(h.signal.signals().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_kills_commit_once() {
        let h = harness();
        let job = seed(&h, "job-1", JobState::Running).await;

        let attempts = (0..16).map(|_| {
            let controller = h.controller.clone();
            let id = job.id.clone();
            tokio::spawn(async move { controller.apply(&id, JobAction::Kill).await })
        });
        let results: Vec<_> = futures::future::join_all(attempts)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let committed = results.iter().filter(|r| r.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Err(AppError::Domain(DomainError::IllegalTransition {
                        from: JobState::Killed,
                        action: JobAction::Kill
                    }))
                )
            })
            .count();

        assert_eq!(committed, 1);
        assert_eq!(rejected, 15);

        let after = h.controller.get(&job.id).await.unwrap();
        assert_eq!(after.state, JobState::Killed);
        assert_eq!(after.version, job.version + 1);

        let kills = h
            .signal
            .signals()
            .iter()
            .filter(|s| s.effect == ExecutionEffect::Kill)
            .count();
        assert_eq!(kills, 1);
    }

    #[tokio::test]
    async fn test_lock_holder_past_timeout_makes_others_busy() {
        let memory = Arc::new(InMemoryJobStore::new());
        memory.insert(&Job::new("job-1", 1000, None)).await.unwrap();
        let slow = Arc::new(SlowJobStore::new(memory, Duration::from_millis(300)));

        let controller = Arc::new(JobController::new(
            slow,
            Arc::new(RecordingSignal::new()),
            Arc::new(ManualTimeProvider::new(10_000)),
            ControllerConfig::default(),
        ));

        let id: JobId = "job-1".into();
        let a = {
            let controller = controller.clone();
            let id = id.clone();
            tokio::spawn(async move { controller.apply(&id, JobAction::Start).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let b = controller
            .apply_with_timeout(&id, JobAction::Kill, Duration::from_millis(50))
            .await;
        assert!(matches!(b, Err(AppError::Busy { ref job_id, .. }) if job_id == "job-1"));
        assert!(!a.is_finished(), "B must give up before A completes");

        let a = a.await.unwrap().unwrap();
        assert_eq!(a.job.state, JobState::Running);
    }

    #[tokio::test]
    async fn test_caller_timeout_is_capped() {
        let memory = Arc::new(InMemoryJobStore::new());
        memory.insert(&Job::new("job-1", 1000, None)).await.unwrap();
        let slow = Arc::new(SlowJobStore::new(memory, Duration::from_millis(600)));

        let controller = Arc::new(JobController::new(
            slow,
            Arc::new(RecordingSignal::new()),
            Arc::new(ManualTimeProvider::new(10_000)),
            ControllerConfig {
                max_lock_timeout: Duration::from_millis(40),
                ..Default::default()
            },
        ));

        let id: JobId = "job-1".into();
        let a = {
            let controller = controller.clone();
            let id = id.clone();
            tokio::spawn(async move { controller.apply(&id, JobAction::Start).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        let b = controller
            .apply_with_timeout(&id, JobAction::Kill, Duration::from_secs(60))
            .await;
        assert!(matches!(b, Err(AppError::Busy { waited_ms: 40, .. })));
        assert!(started.elapsed() < Duration::from_millis(400));
        assert!(!a.is_finished());

        a.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_version_conflicts_are_retried() {
        let memory = Arc::new(InMemoryJobStore::new());
        memory.insert(&Job::new("job-1", 1000, None)).await.unwrap();
        let contended = Arc::new(ContendedJobStore::new(memory, 2));

        let controller = JobController::new(
            contended.clone(),
            Arc::new(RecordingSignal::new()),
            Arc::new(ManualTimeProvider::new(10_000)),
            ControllerConfig::default(),
        );

        let applied = controller
            .apply(&"job-1".to_string(), JobAction::Start)
            .await
            .unwrap();
        assert_eq!(applied.job.version, 1);
        assert_eq!(contended.swap_calls(), 3);
    }

    #[tokio::test]
    async fn test_persistent_conflicts_surface_contention() {
        let memory = Arc::new(InMemoryJobStore::new());
        memory.insert(&Job::new("job-1", 1000, None)).await.unwrap();
        let contended = Arc::new(ContendedJobStore::new(memory.clone(), 10));

        let controller = JobController::new(
            contended.clone(),
            Arc::new(RecordingSignal::new()),
            Arc::new(ManualTimeProvider::new(10_000)),
            ControllerConfig::default(),
        );

        let err = controller
            .apply(&"job-1".to_string(), JobAction::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Contention { attempts: 3, .. }));
        assert!(err.is_retryable());
        assert_eq!(contended.swap_calls(), DEFAULT_MAX_SWAP_ATTEMPTS);

        let untouched = memory.get(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(untouched.version, 0);
    }

    #[tokio::test]
    async fn test_signal_failure_is_a_warning() {
        let h = harness_with(RecordingSignal::failing(SignalError::QueueFull(8)));
        let job = seed(&h, "job-1", JobState::Pending).await;

        let applied = h.controller.apply(&job.id, JobAction::Start).await.unwrap();
        assert_eq!(applied.job.state, JobState::Running);
        assert!(matches!(
            applied.warning,
            Some(ControlWarning::ExecutionSignalFailed { ref job_id, .. }) if job_id == "job-1"
        ));

        // Not rolled back
        assert_eq!(h.controller.get(&job.id).await.unwrap().state, JobState::Running);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let controller = JobController::new(
            Arc::new(BrokenJobStore),
            Arc::new(RecordingSignal::new()),
            Arc::new(ManualTimeProvider::new(10_000)),
            ControllerConfig::default(),
        );

        let err = controller
            .apply(&"job-1".to_string(), JobAction::Start)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_history_of_unknown_job() {
        let h = harness();
        let err = h.controller.history(&"ghost".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::JobNotFound(_)));
    }
}
