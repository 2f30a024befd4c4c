//! Status API handlers

use axum::{extract::State, response::IntoResponse, Json};

use super::SharedNode;
use crate::node::NodeStatus;
use crate::schedule::ScheduleView;

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

/// GET /api/status
pub async fn api_status(State(node): State<SharedNode>) -> Json<NodeStatus> {
    Json(node.status().await)
}

/// GET /api/schedule
pub async fn api_schedule(State(node): State<SharedNode>) -> Json<Vec<ScheduleView>> {
    Json(node.schedule().await)
}
