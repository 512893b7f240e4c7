//! Reporting client for benchmark results.
//!
//! Each completed job is posted as a [`BenchmarkResult`] to
//! `POST /{benchmark_id}` on the reporting service.

use voxbench_core::types::BenchmarkResult;
use voxbench_core::urls::endpoint;

use crate::config::{AuthHeader, WorkerConfig};

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Reporting service returned HTTP {status}: {body}")]
    ApiError { status: u16, body: String },
}

/// Posts benchmark results to one reporting channel.
#[derive(Debug, Clone)]
pub struct ReportClient {
    client: reqwest::Client,
    url: String,
    auth: AuthHeader,
}

impl ReportClient {
    /// Post to `{reporting_url}/{benchmark_id}`.
    pub fn new(
        client: reqwest::Client,
        reporting_url: &str,
        benchmark_id: &str,
        auth: AuthHeader,
    ) -> Self {
        Self {
            client,
            url: endpoint(reporting_url, benchmark_id),
            auth,
        }
    }

    /// Create a client from the worker configuration.
    pub fn from_config(client: reqwest::Client, config: &WorkerConfig) -> Self {
        Self::new(
            client,
            &config.reporting_url,
            &config.benchmark_id,
            config.auth.clone(),
        )
    }

    /// Submit one result. Any non-2xx status is an error.
    pub async fn record(&self, result: &BenchmarkResult<'_>) -> Result<(), ReportError> {
        let response = self
            .client
            .post(&self.url)
            .header(self.auth.name.clone(), self.auth.value.clone())
            .json(result)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
