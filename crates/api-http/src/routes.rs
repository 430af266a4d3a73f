//! Router assembly

use crate::handler;
use crate::render::SCRIPT_PATH;
use axum::routing::get;
use axum::Router;
use jobctl_core::application::{JobController, SubmitService};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<JobController>,
    pub submit: Arc<SubmitService>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handler::health))
        .route(SCRIPT_PATH, get(handler::job_links_script))
        .route("/jobs", get(handler::list_jobs).post(handler::submit_job))
        .route(
            "/jobs/:id",
            get(handler::show_job)
                .post(handler::control_job)
                .delete(handler::delete_job),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
