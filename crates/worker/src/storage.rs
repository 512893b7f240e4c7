//! Artifact upload to pre-signed storage URLs.

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use voxbench_core::urls::strip_query;

/// Content type of the audio produced by the backend.
pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Upload rejected ({status}): {body}")]
    ApiError { status: u16, body: String },
}

/// Uploads payloads with a single `PUT` per destination. Authorization
/// lives in the pre-signed URL, so no headers are added.
#[derive(Debug, Clone)]
pub struct StorageClient {
    client: reqwest::Client,
}

impl StorageClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Upload `payload` to `url` and return the download location, which
    /// is `url` without its query.
    pub async fn upload(&self, payload: Bytes, url: &str) -> Result<String, UploadError> {
        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, AUDIO_CONTENT_TYPE)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UploadError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        Ok(strip_query(url).to_string())
    }
}
