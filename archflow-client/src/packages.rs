//! Package endpoints

use archflow_core::dto::package::{PackageDetails, PackageSummary, StartPackage};
use uuid::Uuid;

use crate::SchedulerClient;
use crate::error::Result;

impl SchedulerClient {
    // =============================================================================
    // Packages
    // =============================================================================

    /// Start processing a package
    ///
    /// # Arguments
    /// * `req` - Package location, kind and the chain or watched directory to start
    ///
    /// # Errors
    /// A 409 [`ApiError`](crate::ClientError::ApiError) when the package is
    /// already being processed, 503 when the scheduler's queue is full.
    pub async fn start_package(&self, req: StartPackage) -> Result<PackageSummary> {
        let response = self
            .client
            .post(self.url("/api/packages"))
            .json(&req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get a package with the jobs executed for it so far
    pub async fn get_package(&self, package_id: Uuid) -> Result<PackageDetails> {
        let url = self.url(&format!("/api/packages/{}", package_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
