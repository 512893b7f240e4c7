//! HTTP client for the message queue service.
//!
//! The queue exposes one named channel. `GET /{queue}` claims the next
//! delivery and `DELETE /{queue}/{messageId}` acknowledges it. Every
//! request carries the static auth header.

use voxbench_core::error::CoreError;
use voxbench_core::types::{FetchResponse, Job, QueueMessage};
use voxbench_core::urls::endpoint;

use crate::config::{AuthHeader, WorkerConfig};

/// Errors from the queue client.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Queue API error ({status}): {body}")]
    ApiError { status: u16, body: String },

    /// A delivery whose body does not parse into a job.
    #[error("Message {message_id} is not a valid job: {source}")]
    Job {
        message_id: String,
        #[source]
        source: CoreError,
    },
}

/// Client for one named queue channel.
#[derive(Debug, Clone)]
pub struct QueueClient {
    client: reqwest::Client,
    queue_url: String,
    queue_name: String,
    auth: AuthHeader,
}

impl QueueClient {
    /// Create a client for `queue_name` served under `queue_url`.
    pub fn new(
        client: reqwest::Client,
        queue_url: String,
        queue_name: String,
        auth: AuthHeader,
    ) -> Self {
        Self {
            client,
            queue_url,
            queue_name,
            auth,
        }
    }

    /// Create a client from the worker configuration.
    pub fn from_config(client: reqwest::Client, config: &WorkerConfig) -> Self {
        Self::new(
            client,
            config.queue_url.clone(),
            config.queue_name.clone(),
            config.auth.clone(),
        )
    }

    /// Claim the next available message.
    ///
    /// Returns `Ok(None)` when the queue is empty. Only the first message
    /// of a response is used.
    pub async fn fetch_next(&self) -> Result<Option<(QueueMessage, Job)>, QueueError> {
        let response = self
            .client
            .get(endpoint(&self.queue_url, &self.queue_name))
            .header(self.auth.name.clone(), self.auth.value.clone())
            .send()
            .await?;

        let fetched: FetchResponse = Self::parse_response(response).await?;
        let Some(message) = fetched.into_first() else {
            return Ok(None);
        };

        match Job::from_message_body(&message.body) {
            Ok(job) => Ok(Some((message, job))),
            Err(source) => Err(QueueError::Job {
                message_id: message.message_id,
                source,
            }),
        }
    }

    /// Delete a delivery by its handle once the job is fully processed.
    ///
    /// Only the status is checked; the response body is ignored.
    pub async fn acknowledge(&self, message_id: &str) -> Result<(), QueueError> {
        let response = self
            .client
            .delete(self.delete_url(message_id))
            .header(self.auth.name.clone(), self.auth.value.clone())
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Handles are opaque and may contain `/`, `+` or `=`.
    fn delete_url(&self, message_id: &str) -> String {
        endpoint(
            &self.queue_url,
            &format!("{}/{}", self.queue_name, urlencoding::encode(message_id)),
        )
    }

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, QueueError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(QueueError::ApiError {
            status: status.as_u16(),
            body,
        })
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, QueueError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
