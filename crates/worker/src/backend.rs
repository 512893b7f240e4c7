//! HTTP client for the generation backend.
//!
//! Wraps the two backend endpoints the worker needs: `GET /hc` for
//! readiness and `POST /generate` for synthesis. The client sets no
//! timeout and no concurrency limit of its own; the worker loop only
//! ever has one submission in flight.

use bytes::Bytes;
use voxbench_core::types::GenerationRequest;
use voxbench_core::urls::endpoint;

/// Errors from the backend client.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend answered with a non-2xx status.
    #[error("Error submitting job: {status} {status_text}\n{body}")]
    Rejected {
        status: u16,
        status_text: String,
        /// Raw response body for debugging.
        body: String,
    },
}

/// HTTP client for a single generation backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    /// * `base_url` - e.g. `http://127.0.0.1:8000`.
    pub fn new(base_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }

    /// Query the health endpoint.
    ///
    /// Any HTTP response, including an error status, counts as reachable;
    /// only transport failures are errors.
    pub async fn health_check(&self) -> Result<String, reqwest::Error> {
        self.client
            .get(endpoint(&self.base_url, "hc"))
            .send()
            .await?
            .text()
            .await
    }

    /// Submit one generation request and return the raw audio payload.
    ///
    /// Non-2xx responses are returned as [`BackendError::Rejected`] and
    /// never retried.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Bytes, BackendError> {
        let response = self
            .client
            .post(endpoint(&self.base_url, "generate"))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        Ok(response.bytes().await?)
    }
}
