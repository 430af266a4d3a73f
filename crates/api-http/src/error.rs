//! HTTP Error Mapping
//!
//! Maps application errors to status codes:
//! 404 unknown job, 409 illegal transition or taken id, 423 lock busy or
//! version contention, 400 malformed input, 500 everything else.

use crate::render;
use crate::types::{ErrorBody, ErrorResponse, Format};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use jobctl_core::domain::DomainError;
use jobctl_core::error::AppError;
use tracing::error;

/// Seconds a client should wait before retrying a 423
pub const RETRY_AFTER_SECS: u64 = 1;

pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::JobNotFound(_) => StatusCode::NOT_FOUND,
        AppError::Domain(DomainError::IllegalTransition { .. }) => StatusCode::CONFLICT,
        AppError::Domain(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::Conflict(_) => StatusCode::CONFLICT,
        AppError::Busy { .. } | AppError::Contention { .. } => StatusCode::LOCKED,
        AppError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Application error rendered in the representation the caller asked for
#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub format: Format,
}

impl ApiError {
    pub fn new(error: AppError, format: Format) -> Self {
        Self { error, format }
    }

    pub fn validation(message: impl Into<String>, format: Format) -> Self {
        Self::new(AppError::Validation(message.into()), format)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        let message = self.error.to_string();
        if status.is_server_error() {
            error!(kind = self.error.kind(), error = %message, "Request failed");
        }

        let mut response = match self.format {
            Format::Json => (
                status,
                Json(ErrorResponse {
                    error: ErrorBody {
                        kind: self.error.kind(),
                        message,
                    },
                }),
            )
                .into_response(),
            Format::Html => (status, Html(render::error_page(status, &message))).into_response(),
        };

        if self.error.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}
