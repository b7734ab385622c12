//! API Module
//!
//! HTTP API layer for the scheduler.
//! Each submodule handles endpoints for a specific domain.

pub mod decision;
pub mod error;
pub mod health;
pub mod package;
pub mod workflow;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::service::AppState;

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Workflow endpoints
        .route("/api/workflow", get(workflow::get_workflow))
        // Package endpoints
        .route("/api/packages", post(package::start_package))
        .route("/api/packages/{id}", get(package::get_package))
        // Decision endpoints
        .route("/api/decisions", get(decision::list_decisions))
        .route("/api/decisions/{job_id}", post(decision::make_decision))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
