//! Decision endpoints

use archflow_core::dto::decision::{AwaitingDecision, MakeDecision};
use uuid::Uuid;

use crate::SchedulerClient;
use crate::error::Result;

impl SchedulerClient {
    // =============================================================================
    // Decisions
    // =============================================================================

    /// List jobs waiting on a choice, oldest first
    pub async fn list_decisions(&self) -> Result<Vec<AwaitingDecision>> {
        let response = self.client.get(self.url("/api/decisions")).send().await?;

        self.handle_response(response).await
    }

    /// Answer a parked decision
    ///
    /// # Arguments
    /// * `job_id` - The parked job
    /// * `choice` - Value of one of the offered choices
    ///
    /// # Errors
    /// A 404 [`ApiError`](crate::ClientError::ApiError) when no such job is
    /// parked, 400 when the choice is not one of those offered.
    pub async fn make_decision(&self, job_id: Uuid, choice: impl Into<String>) -> Result<()> {
        let url = self.url(&format!("/api/decisions/{}", job_id));
        let req = MakeDecision {
            choice: choice.into(),
        };
        tracing::debug!("Sending choice {} for job {}", req.choice, job_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_empty_response(response).await
    }
}
