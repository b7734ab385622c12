//! Workflow API Handlers

use archflow_core::dto::workflow::WorkflowSummary;
use axum::{Json, extract::State};

use crate::service::AppState;

/// GET /api/workflow
/// Size of the loaded workflow
pub async fn get_workflow(State(state): State<AppState>) -> Json<WorkflowSummary> {
    Json(WorkflowSummary::from(state.workflow.as_ref()))
}
