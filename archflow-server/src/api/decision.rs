//! Decision API Handlers
//!
//! HTTP endpoints for jobs waiting on a user's choice.

use archflow_core::dto::decision::{AwaitingDecision, MakeDecision};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::service::{AppState, decision_service};

/// GET /api/decisions
/// List parked decisions
pub async fn list_decisions(State(state): State<AppState>) -> Json<Vec<AwaitingDecision>> {
    Json(decision_service::list_awaiting(&state))
}

/// POST /api/decisions/{job_id}
/// Resolve a parked decision
pub async fn make_decision(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
    Json(req): Json<MakeDecision>,
) -> ApiResult<StatusCode> {
    tracing::info!("Decision for job {}: {}", job_id, req.choice);

    decision_service::make_decision(&state, job_id, &req.choice).await?;
    Ok(StatusCode::NO_CONTENT)
}
