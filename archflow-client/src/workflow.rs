//! Workflow endpoints

use archflow_core::dto::workflow::WorkflowSummary;

use crate::SchedulerClient;
use crate::error::Result;

impl SchedulerClient {
    /// Size of the workflow the scheduler has loaded
    pub async fn get_workflow(&self) -> Result<WorkflowSummary> {
        let response = self.client.get(self.url("/api/workflow")).send().await?;

        self.handle_response(response).await
    }
}
