//! Status API - read-only HTTP view of the running node
//!
//! Provides:
//! - Health check
//! - Node status (known systems, outbox backlog)
//! - Scheduler deadlines

pub mod routes;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::node::Node;

pub type SharedNode = Arc<Node>;

/// Create the status API router
pub fn create_router(node: SharedNode) -> Router {
    Router::new()
        .route("/api/status", get(routes::api_status))
        .route("/api/schedule", get(routes::api_schedule))
        .route("/health", get(routes::health))
        .with_state(node)
}
