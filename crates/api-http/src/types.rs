//! Request and response shapes of the HTTP surface

use axum::http::{header, HeaderMap};
use jobctl_core::application::ControlWarning;
use jobctl_core::domain::{Job, TransitionRecord};
use serde::{Deserialize, Serialize};

/// Representation chosen from the `Accept` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Html,
    Json,
}

impl Format {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let wants_json = headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|v| v.trim().starts_with("application/json"));
        if wants_json {
            Format::Json
        } else {
            Format::Html
        }
    }
}

/// `POST /jobs/{id}` form body
#[derive(Debug, Default, Deserialize)]
pub struct ActionForm {
    pub action: Option<String>,
}

/// `POST /jobs` form body; empty fields count as absent
#[derive(Debug, Default, Deserialize)]
pub struct SubmitForm {
    pub id: Option<String>,
    pub label: Option<String>,
}

/// Query accepted by the mutating routes
#[derive(Debug, Default, Deserialize)]
pub struct ControlQuery {
    /// Caller's lock wait budget in milliseconds
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub state: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub job: Job,
    pub warning: Option<ControlWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<TransitionRecord>>,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}
