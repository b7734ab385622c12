//! Worker transport
//!
//! Moves one batch of tasks to the workers serving a capability and brings
//! their results back.

use archflow_core::dto::task::{BatchRequest, BatchResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while submitting a batch
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("worker gateway returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no worker available for {0}")]
    Unavailable(String),
}

/// Channel to the remote workers
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submits a batch and waits for every task's result
    ///
    /// # Arguments
    /// * `capability` - Script name the workers must provide
    /// * `batch` - Tasks to run
    async fn submit_batch(
        &self,
        capability: &str,
        batch: &BatchRequest,
    ) -> Result<BatchResponse, TransportError>;
}

/// HTTP implementation of [`Transport`]
///
/// Posts batches to `{gateway_url}/tasks/{capability}`.
pub struct HttpTransport {
    client: Client,
    gateway_url: String,
    timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport for the given gateway
    ///
    /// # Arguments
    /// * `gateway_url` - Base URL of the worker gateway (e.g., "http://localhost:4730")
    /// * `timeout` - Maximum time one batch may take
    pub fn new(gateway_url: impl Into<String>, timeout: Duration) -> Self {
        Self::with_client(gateway_url, timeout, Client::new())
    }

    pub fn with_client(gateway_url: impl Into<String>, timeout: Duration, client: Client) -> Self {
        Self {
            client,
            gateway_url: gateway_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn batch_url(&self, capability: &str) -> String {
        format!("{}/tasks/{}", self.gateway_url, capability)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit_batch(
        &self,
        capability: &str,
        batch: &BatchRequest,
    ) -> Result<BatchResponse, TransportError> {
        let response = self
            .client
            .post(self.batch_url(capability))
            .timeout(self.timeout)
            .json(batch)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(TransportError::Unavailable(capability.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<BatchResponse>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archflow_core::dto::task::TaskPayload;

    #[test]
    fn test_batch_url() {
        let transport = HttpTransport::new("http://gearman:4730/", Duration::from_secs(5));
        assert_eq!(
            transport.batch_url("identify_v1.0"),
            "http://gearman:4730/tasks/identify_v1.0"
        );
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_request_error() {
        let transport = HttpTransport::new("http://127.0.0.1:1", Duration::from_secs(2));
        let err = transport
            .submit_batch("echo", &BatchRequest::new(Vec::<TaskPayload>::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
    }
}
