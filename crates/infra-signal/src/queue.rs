// Queued execution signal channel
//
// `notify` only enqueues (never waits on the executor); a dispatcher task
// drains the queue into a `SignalSink`, retrying failed deliveries.

use crate::sink::SignalSink;
use async_trait::async_trait;
use jobctl_core::application::{RetryDecision, RetryPolicy, ShutdownToken};
use jobctl_core::port::{ExecutionSignal, Signal, SignalError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, info, warn};

/// Producer half handed to the controller
#[derive(Clone)]
pub struct QueuedSignalChannel {
    tx: mpsc::Sender<Signal>,
    capacity: usize,
}

/// Create a bounded signal queue
pub fn signal_channel(capacity: usize) -> (QueuedSignalChannel, mpsc::Receiver<Signal>) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (QueuedSignalChannel { tx, capacity }, rx)
}

#[async_trait]
impl ExecutionSignal for QueuedSignalChannel {
    async fn notify(&self, signal: Signal) -> Result<(), SignalError> {
        self.tx.try_send(signal).map_err(|e| match e {
            TrySendError::Full(_) => SignalError::QueueFull(self.capacity),
            TrySendError::Closed(_) => SignalError::Disconnected,
        })
    }
}

/// Consumer loop delivering queued signals to the executor
pub struct SignalDispatcher {
    rx: mpsc::Receiver<Signal>,
    sink: Arc<dyn SignalSink>,
    retry: RetryPolicy,
}

impl SignalDispatcher {
    pub fn new(rx: mpsc::Receiver<Signal>, sink: Arc<dyn SignalSink>, retry: RetryPolicy) -> Self {
        Self { rx, sink, retry }
    }

    /// Run until shutdown is requested or every producer is gone.
    ///
    /// Signals still queued at shutdown, and one whose retries shutdown
    /// interrupted, get a single delivery attempt each.
    pub async fn run(mut self, mut shutdown: ShutdownToken) {
        info!("Signal dispatcher started");
        let mut interrupted = None;
        loop {
            let next = tokio::select! {
                received = self.rx.recv() => received,
                _ = shutdown.wait() => None,
            };
            let Some(signal) = next else {
                break;
            };

            let delivered = tokio::select! {
                _ = self.deliver(&signal) => true,
                _ = shutdown.wait() => false,
            };
            if !delivered {
                warn!(job_id = %signal.job_id, version = signal.version, "Shutdown interrupted signal delivery");
                interrupted = Some(signal);
                break;
            }
        }
        self.drain(interrupted).await;
        info!("Signal dispatcher stopped");
    }

    async fn deliver(&self, signal: &Signal) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let err = match self.sink.deliver(signal).await {
                Ok(()) => return,
                Err(e) => e,
            };

            match self.retry.should_retry(attempts, &signal.job_id) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        job_id = %signal.job_id,
                        version = signal.version,
                        attempts,
                        error = %err,
                        "Signal delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    error!(
                        job_id = %signal.job_id,
                        state = %signal.state,
                        version = signal.version,
                        attempts,
                        error = %err,
                        "Dropping execution signal after repeated delivery failures"
                    );
                    return;
                }
            }
        }
    }

    async fn drain(&mut self, interrupted: Option<Signal>) {
        self.rx.close();
        if let Some(signal) = interrupted {
            self.deliver_once(&signal).await;
        }
        while let Ok(signal) = self.rx.try_recv() {
            self.deliver_once(&signal).await;
        }
    }

    async fn deliver_once(&self, signal: &Signal) {
        if let Err(e) = self.sink.deliver(signal).await {
            error!(job_id = %signal.job_id, error = %e, "Dropping execution signal during shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobctl_core::application::shutdown_channel;
    use jobctl_core::domain::{JobAction, JobState};
    use jobctl_core::port::ExecutionEffect;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn signal(job_id: &str, version: i64) -> Signal {
        Signal {
            job_id: job_id.to_string(),
            action: JobAction::Start,
            state: JobState::Running,
            version,
            effect: ExecutionEffect::Begin,
        }
    }

    /// Fails the first `failures` deliveries, then records
    #[derive(Default)]
    struct FlakySink {
        failures: AtomicU32,
        calls: AtomicU32,
        delivered: Mutex<Vec<Signal>>,
    }

    impl FlakySink {
        fn failing(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                ..Default::default()
            }
        }

        fn delivered(&self) -> Vec<Signal> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SignalSink for FlakySink {
        async fn deliver(&self, signal: &Signal) -> Result<(), SignalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if fail {
                return Err(SignalError::Delivery("executor offline".to_string()));
            }
            self.delivered.lock().unwrap().push(signal.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_notify_reports_full_queue() {
        let (channel, _rx) = signal_channel(1);
        channel.notify(signal("a", 1)).await.unwrap();

        let err = channel.notify(signal("a", 2)).await.unwrap_err();
        assert_eq!(err, SignalError::QueueFull(1));
    }

    #[tokio::test]
    async fn test_notify_reports_disconnect() {
        let (channel, rx) = signal_channel(4);
        drop(rx);

        let err = channel.notify(signal("a", 1)).await.unwrap_err();
        assert_eq!(err, SignalError::Disconnected);
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_in_order() {
        let (channel, rx) = signal_channel(16);
        let sink = Arc::new(FlakySink::default());
        let (_tx, token) = shutdown_channel();
        let dispatcher = SignalDispatcher::new(rx, sink.clone(), RetryPolicy::new(1, 3));

        for version in 1..=3 {
            channel.notify(signal("a", version)).await.unwrap();
        }
        drop(channel);

        // All producers gone -> dispatcher finishes the queue and exits
        tokio::time::timeout(Duration::from_secs(1), dispatcher.run(token))
            .await
            .unwrap();

        let versions: Vec<i64> = sink.delivered().iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_dispatcher_retries_failed_delivery() {
        let (channel, rx) = signal_channel(16);
        let sink = Arc::new(FlakySink::failing(2));
        let (_tx, token) = shutdown_channel();
        let dispatcher = SignalDispatcher::new(rx, sink.clone(), RetryPolicy::new(1, 5));

        channel.notify(signal("a", 1)).await.unwrap();
        drop(channel);
        tokio::time::timeout(Duration::from_secs(1), dispatcher.run(token))
            .await
            .unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatcher_gives_up_and_moves_on() {
        let (channel, rx) = signal_channel(16);
        let sink = Arc::new(FlakySink::failing(2));
        let (_tx, token) = shutdown_channel();
        let dispatcher = SignalDispatcher::new(rx, sink.clone(), RetryPolicy::new(1, 2));

        channel.notify(signal("a", 1)).await.unwrap();
        channel.notify(signal("b", 1)).await.unwrap();
        drop(channel);
        tokio::time::timeout(Duration::from_secs(1), dispatcher.run(token))
            .await
            .unwrap();

        let delivered: Vec<String> = sink.delivered().into_iter().map(|s| s.job_id).collect();
        assert_eq!(delivered, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_dispatcher_stops_on_shutdown() {
        let (channel, rx) = signal_channel(16);
        let sink = Arc::new(FlakySink::default());
        let (tx, token) = shutdown_channel();
        let dispatcher = SignalDispatcher::new(rx, sink.clone(), RetryPolicy::new(1, 3));

        let handle = tokio::spawn(dispatcher.run(token));
        tx.shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        // Producer outlives the dispatcher; further notifies fail fast
        assert_eq!(
            channel.notify(signal("a", 1)).await,
            Err(SignalError::Disconnected)
        );
    }

    #[tokio::test]
    async fn test_interrupted_signal_gets_final_attempt() {
        let (channel, rx) = signal_channel(16);
        let sink = Arc::new(FlakySink::failing(1));
        let (tx, token) = shutdown_channel();
        let dispatcher = SignalDispatcher::new(rx, sink.clone(), RetryPolicy::new(500, 5));

        let handle = tokio::spawn(dispatcher.run(token));
        channel.notify(signal("a", 1)).await.unwrap();

        // First delivery fails; shut down while the retry is backing off
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.shutdown();
        tokio::time::timeout(Duration::from_millis(400), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(sink.delivered().len(), 1);
    }
}
