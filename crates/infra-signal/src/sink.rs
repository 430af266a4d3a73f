// Signal sinks - where dispatched signals end up

use async_trait::async_trait;
use jobctl_core::port::{Signal, SignalError};
use std::time::Duration;
use tracing::info;

/// Final destination of an execution signal (the job runner)
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn deliver(&self, signal: &Signal) -> Result<(), SignalError>;
}

/// Logs each signal; used when no executor endpoint is configured
pub struct TracingSink;

#[async_trait]
impl SignalSink for TracingSink {
    async fn deliver(&self, signal: &Signal) -> Result<(), SignalError> {
        info!(
            job_id = %signal.job_id,
            action = %signal.action,
            state = %signal.state,
            version = signal.version,
            effect = ?signal.effect,
            "Execution signal"
        );
        Ok(())
    }
}

/// POSTs each signal as JSON to the executor
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    /// # Arguments
    /// * `url` - Executor endpoint receiving `Signal` JSON bodies
    /// * `request_timeout` - Per-request timeout
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, SignalError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SignalError::Delivery(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl SignalSink for WebhookSink {
    async fn deliver(&self, signal: &Signal) -> Result<(), SignalError> {
        let response = self
            .client
            .post(&self.url)
            .json(signal)
            .send()
            .await
            .map_err(|e| SignalError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SignalError::Delivery(format!(
                "executor answered {} for job {}",
                status, signal.job_id
            )));
        }
        Ok(())
    }
}
