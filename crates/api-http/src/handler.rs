//! Route Handlers
//!
//! Decode the request, call the controller, render the outcome.

use crate::error::ApiError;
use crate::render;
use crate::routes::AppState;
use crate::types::{
    ActionForm, ControlQuery, Format, JobListResponse, JobResponse, ListQuery, SubmitForm,
};
use axum::extract::rejection::{FormRejection, PathRejection, QueryRejection};
use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use jobctl_core::application::constants::DEFAULT_LIST_LIMIT;
use jobctl_core::application::{Applied, ControlWarning, SubmitRequest};
use jobctl_core::domain::{Job, JobAction, JobId, JobState};
use std::time::Duration;
use tracing::debug;

type HandlerResult = std::result::Result<Response, ApiError>;

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /js/job_links.js
pub async fn job_links_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        render::JOB_LINKS_JS,
    )
}

/// GET /jobs?state=&limit=
pub async fn list_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> HandlerResult {
    let format = Format::from_headers(&headers);
    let Query(query) = query.map_err(|r| ApiError::validation(r.body_text(), format))?;
    let filter = query
        .state
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<JobState>)
        .transpose()
        .map_err(|e| ApiError::new(e.into(), format))?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);

    let jobs = state
        .controller
        .list(filter, limit)
        .await
        .map_err(|e| ApiError::new(e, format))?;

    Ok(match format {
        Format::Json => Json(JobListResponse { jobs }).into_response(),
        Format::Html => Html(render::job_list_page(&jobs, filter)).into_response(),
    })
}

/// GET /jobs/{id}
pub async fn show_job(
    State(state): State<AppState>,
    id: Result<Path<JobId>, PathRejection>,
    headers: HeaderMap,
) -> HandlerResult {
    let format = Format::from_headers(&headers);
    let Path(id) = id.map_err(|r| ApiError::validation(r.body_text(), format))?;
    let job = state
        .controller
        .get(&id)
        .await
        .map_err(|e| ApiError::new(e, format))?;
    let history = state
        .controller
        .history(&id)
        .await
        .map_err(|e| ApiError::new(e, format))?;

    Ok(match format {
        Format::Json => Json(JobResponse {
            job,
            warning: None,
            history: Some(history),
        })
        .into_response(),
        Format::Html => Html(render::job_page(&job, None, Some(&history))).into_response(),
    })
}

/// POST /jobs (form: `id`, `label`)
pub async fn submit_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<SubmitForm>, FormRejection>,
) -> HandlerResult {
    let format = Format::from_headers(&headers);
    let form = match form {
        Ok(Form(form)) => form,
        // A bare POST with no body submits an anonymous job
        Err(FormRejection::InvalidFormContentType(_)) => SubmitForm::default(),
        Err(rejection) => return Err(ApiError::validation(rejection.body_text(), format)),
    };

    let request = SubmitRequest {
        id: form.id.filter(|s| !s.trim().is_empty()),
        label: form.label,
    };
    let job = state
        .submit
        .submit(request)
        .await
        .map_err(|e| ApiError::new(e, format))?;

    let location = HeaderValue::from_str(&format!("/jobs/{}", job.id)).ok();
    let mut response = job_response(job, None, format);
    *response.status_mut() = StatusCode::CREATED;
    if let Some(location) = location {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

/// POST /jobs/{id} (form: `action=start|resume|pause|stop|kill`)
pub async fn control_job(
    State(state): State<AppState>,
    id: Result<Path<JobId>, PathRejection>,
    query: Result<Query<ControlQuery>, QueryRejection>,
    headers: HeaderMap,
    form: Result<Form<ActionForm>, FormRejection>,
) -> HandlerResult {
    let format = Format::from_headers(&headers);
    let Path(id) = id.map_err(|r| ApiError::validation(r.body_text(), format))?;
    let Query(query) = query.map_err(|r| ApiError::validation(r.body_text(), format))?;
    let raw = match form {
        Ok(Form(ActionForm {
            action: Some(action),
        })) if !action.trim().is_empty() => action,
        Ok(_) | Err(FormRejection::InvalidFormContentType(_)) => {
            return Err(ApiError::validation("Missing form field: action", format));
        }
        Err(rejection) => return Err(ApiError::validation(rejection.body_text(), format)),
    };

    let action: JobAction = raw
        .parse()
        .map_err(|e: jobctl_core::domain::DomainError| ApiError::new(e.into(), format))?;
    if action == JobAction::Delete {
        return Err(ApiError::validation(
            format!("Use DELETE /jobs/{} to delete a job", id),
            format,
        ));
    }

    debug!(job_id = %id, action = %action, "Control request");
    let applied = apply(&state, &id, action, query.timeout_ms)
        .await
        .map_err(|e| ApiError::new(e, format))?;
    Ok(applied_response(applied, format))
}

/// DELETE /jobs/{id}
pub async fn delete_job(
    State(state): State<AppState>,
    id: Result<Path<JobId>, PathRejection>,
    query: Result<Query<ControlQuery>, QueryRejection>,
    headers: HeaderMap,
) -> HandlerResult {
    let format = Format::from_headers(&headers);
    let Path(id) = id.map_err(|r| ApiError::validation(r.body_text(), format))?;
    let Query(query) = query.map_err(|r| ApiError::validation(r.body_text(), format))?;
    debug!(job_id = %id, "Delete request");
    let applied = apply(&state, &id, JobAction::Delete, query.timeout_ms)
        .await
        .map_err(|e| ApiError::new(e, format))?;
    Ok(applied_response(applied, format))
}

async fn apply(
    state: &AppState,
    id: &JobId,
    action: JobAction,
    timeout_ms: Option<u64>,
) -> jobctl_core::Result<Applied> {
    match timeout_ms {
        Some(ms) => {
            state
                .controller
                .apply_with_timeout(id, action, Duration::from_millis(ms))
                .await
        }
        None => state.controller.apply(id, action).await,
    }
}

fn applied_response(applied: Applied, format: Format) -> Response {
    let warning_value = applied.warning.as_ref().and_then(warning_header);
    let mut response = job_response(applied.job, applied.warning, format);
    if let Some(value) = warning_value {
        response.headers_mut().insert(header::WARNING, value);
    }
    response
}

fn job_response(job: Job, warning: Option<ControlWarning>, format: Format) -> Response {
    match format {
        Format::Json => Json(JobResponse {
            job,
            warning,
            history: None,
        })
        .into_response(),
        Format::Html => Html(render::job_page(&job, warning.as_ref(), None)).into_response(),
    }
}

/// `Warning: 199 jobctl "<text>"`; characters a header cannot carry are dropped
fn warning_header(warning: &ControlWarning) -> Option<HeaderValue> {
    let text: String = warning
        .to_string()
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .map(|c| if c == '"' || c == '\\' { '\'' } else { c })
        .collect();
    HeaderValue::from_str(&format!("199 jobctl \"{}\"", text)).ok()
}
