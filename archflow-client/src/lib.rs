//! Archflow HTTP Client
//!
//! Typed client for the scheduler's control API, used by the command-line
//! tool and by anything else that starts packages or answers decisions.
//!
//! # Example
//!
//! ```no_run
//! use archflow_client::SchedulerClient;
//! use archflow_core::domain::package::PackageKind;
//! use archflow_core::dto::package::StartPackage;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = SchedulerClient::new("http://localhost:8080");
//!
//!     let package = client.start_package(StartPackage {
//!         path: "watchedDirectories/activeTransfers/standardTransfer/images/".to_string(),
//!         kind: PackageKind::Transfer,
//!         chain_id: None,
//!         watched_directory: Some("activeTransfers/standardTransfer".to_string()),
//!         processing_configuration: Some("automated".to_string()),
//!     }).await?;
//!
//!     println!("Started package: {}", package.id);
//!     Ok(())
//! }
//! ```

mod decisions;
pub mod error;
mod packages;
mod workflow;

pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the scheduler API
///
/// Endpoints are grouped by domain:
/// - Packages (start, inspect)
/// - Decisions (list parked jobs, answer them)
/// - Workflow and health
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    /// Base URL of the scheduler (e.g., "http://localhost:8080")
    base_url: String,
    client: Client,
}

impl SchedulerClient {
    /// Create a new scheduler client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the scheduler API (e.g., "http://localhost:8080")
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new scheduler client with a custom HTTP client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the scheduler API
    /// * `client` - A configured reqwest Client (timeouts, proxies, TLS)
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the scheduler
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check that the scheduler is reachable
    pub async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;
        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code and deserialize a JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Check the status code of a response without a body
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}
