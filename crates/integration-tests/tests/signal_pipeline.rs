//! Controller -> bounded signal queue -> dispatcher -> sink

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use jobctl_core::application::{
    shutdown_channel, ControlWarning, ControllerConfig, JobController, RetryPolicy,
};
use jobctl_core::domain::{Job, JobAction, JobState};
use jobctl_core::port::job_store::memory::InMemoryJobStore;
use jobctl_core::port::time_provider::mocks::ManualTimeProvider;
use jobctl_core::port::{ExecutionEffect, JobStore, Signal, SignalError};
use jobctl_infra_signal::{signal_channel, SignalDispatcher, SignalSink};

#[derive(Default)]
struct CollectingSink {
    signals: Mutex<Vec<Signal>>,
}

impl CollectingSink {
    fn signals(&self) -> Vec<Signal> {
        self.signals.lock().unwrap().clone()
    }
}

#[async_trait]
impl SignalSink for CollectingSink {
    async fn deliver(&self, signal: &Signal) -> Result<(), SignalError> {
        self.signals.lock().unwrap().push(signal.clone());
        Ok(())
    }
}

async fn seeded_store(id: &str) -> Arc<dyn JobStore> {
    let store = Arc::new(InMemoryJobStore::new());
    store.insert(&Job::new(id, 0, None)).await.unwrap();
    store
}

#[tokio::test]
async fn test_committed_transitions_reach_the_executor_in_order() {
    let store = seeded_store("job").await;
    let (channel, rx) = signal_channel(16);
    let sink = Arc::new(CollectingSink::default());
    let (shutdown_tx, shutdown) = shutdown_channel();
    let dispatcher = tokio::spawn(
        SignalDispatcher::new(rx, sink.clone(), RetryPolicy::new(1, 3)).run(shutdown),
    );

    let controller = JobController::new(
        store,
        Arc::new(channel),
        Arc::new(ManualTimeProvider::new(0)),
        ControllerConfig::default(),
    );
    let id = "job".to_string();
    for action in [
        JobAction::Start,
        JobAction::Pause,
        JobAction::Resume,
        JobAction::Kill,
        JobAction::Delete,
    ] {
        let applied = controller.apply(&id, action).await.unwrap();
        assert!(applied.warning.is_none());
    }
    // Rejected actions never produce a signal
    assert!(controller.apply(&id, JobAction::Kill).await.is_err());

    // Dropping the controller drops the last producer; the dispatcher drains and exits
    drop(controller);
    tokio::time::timeout(Duration::from_secs(2), dispatcher)
        .await
        .unwrap()
        .unwrap();
    drop(shutdown_tx);

    let delivered: Vec<(i64, JobState, ExecutionEffect)> = sink
        .signals()
        .iter()
        .map(|s| (s.version, s.state, s.effect))
        .collect();
    assert_eq!(
        delivered,
        vec![
            (1, JobState::Running, ExecutionEffect::Begin),
            (2, JobState::Paused, ExecutionEffect::Suspend),
            (3, JobState::Running, ExecutionEffect::Resume),
            (4, JobState::Killed, ExecutionEffect::Kill),
            (5, JobState::Deleted, ExecutionEffect::Release),
        ]
    );
}

#[tokio::test]
async fn test_full_queue_is_a_warning_not_a_rollback() {
    let store = seeded_store("job").await;
    // Nobody drains this queue
    let (channel, _rx) = signal_channel(1);
    let controller = JobController::new(
        store.clone(),
        Arc::new(channel),
        Arc::new(ManualTimeProvider::new(0)),
        ControllerConfig::default(),
    );
    let id = "job".to_string();

    let first = controller.apply(&id, JobAction::Start).await.unwrap();
    assert!(first.warning.is_none());

    let second = controller.apply(&id, JobAction::Pause).await.unwrap();
    assert_eq!(second.job.state, JobState::Paused);
    assert!(matches!(
        second.warning,
        Some(ControlWarning::ExecutionSignalFailed { .. })
    ));

    let stored = store.get(&id).await.unwrap().unwrap();
    assert_eq!(stored.state, JobState::Paused);
    assert_eq!(stored.version, 2);
}
