// Submit Use Case - creation path for new jobs

use crate::application::constants::{MAX_JOB_ID_LEN, MAX_LABEL_LEN};
use crate::domain::Job;
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStore, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Submit request; both fields optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Caller-chosen id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Validate a submit request before touching the store
pub fn validate_request(req: &SubmitRequest) -> Result<()> {
    if let Some(id) = &req.id {
        if id.is_empty() {
            return Err(AppError::Validation("Job id cannot be empty".to_string()));
        }
        if id.len() > MAX_JOB_ID_LEN {
            return Err(AppError::Validation(format!(
                "Job id too long (max {} characters)",
                MAX_JOB_ID_LEN
            )));
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(AppError::Validation(
                "Job id must be alphanumeric (plus '-', '_' or '.')".to_string(),
            ));
        }
    }
    if let Some(label) = &req.label {
        if label.chars().count() > MAX_LABEL_LEN {
            return Err(AppError::Validation(format!(
                "Label too long (max {} characters)",
                MAX_LABEL_LEN
            )));
        }
    }
    Ok(())
}

/// Create a `Pending` job
///
/// # Arguments
///
/// * `store` - Job store
/// * `id_provider` - ID generator (injected for determinism)
/// * `time_provider` - Time provider (injected for determinism)
/// * `req` - Submit request
pub async fn execute(
    store: &dyn JobStore,
    id_provider: &dyn IdProvider,
    time_provider: &dyn TimeProvider,
    req: SubmitRequest,
) -> Result<Job> {
    validate_request(&req)?;

    let id = req.id.unwrap_or_else(|| id_provider.generate_id());
    let label = req.label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
    let job = Job::new(id, time_provider.now_millis(), label);

    store.insert(&job).await?;
    info!(job_id = %job.id, "Job submitted");

    Ok(job)
}

/// Submit service holding its collaborators
pub struct SubmitService {
    store: Arc<dyn JobStore>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SubmitService {
    pub fn new(
        store: Arc<dyn JobStore>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            id_provider,
            time_provider,
        }
    }

    pub async fn submit(&self, req: SubmitRequest) -> Result<Job> {
        execute(
            self.store.as_ref(),
            self.id_provider.as_ref(),
            self.time_provider.as_ref(),
            req,
        )
        .await
    }
}
