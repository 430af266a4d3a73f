//! HTTP Gateway
//!
//! Stateless request/response surface over the job controller.
//! Every response is either a JSON document (when the caller sends
//! `Accept: application/json`) or a complete HTML page that a thin client
//! can swap in as the new page body.

pub mod error;
pub mod handler;
pub mod render;
pub mod routes;
pub mod server;
pub mod types;


pub use routes::{create_router, AppState};
pub use server::{serve, HttpServerConfig};
