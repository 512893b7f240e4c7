//! Wire and domain types for queue messages, jobs, generation requests
//! and benchmark reports.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Text submitted once at startup to prove the backend can generate
/// end to end before any job is counted.
pub const WARMUP_TEXT: &str = "This is a test";

/// Voice preset used for the warm-up submission.
pub const WARMUP_VOICE_PRESET: &str = "v2/en_speaker_6";

// ---------------------------------------------------------------------------
// Queue wire types
// ---------------------------------------------------------------------------

/// A single delivery returned by the queue service.
///
/// `message_id` is the delivery handle (a receipt), not the job id. It
/// is only valid for deleting this particular delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    #[serde(rename = "messageId")]
    pub message_id: String,
    /// JSON-encoded [`Job`].
    pub body: String,
}

/// Response of `GET /{queue}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub messages: Vec<QueueMessage>,
}

impl FetchResponse {
    /// The worker claims at most one message per fetch; anything past
    /// the first is ignored and left to be redelivered.
    pub fn into_first(self) -> Option<QueueMessage> {
        self.messages.into_iter().next()
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Business identifier of a job. Producers send either a number or a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobId {
    Number(i64),
    Text(String),
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobId::Number(n) => write!(f, "{n}"),
            JobId::Text(s) => f.write_str(s),
        }
    }
}

/// Where the generated artifact must be uploaded: one pre-signed URL or
/// several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UploadTarget {
    Single(String),
    Many(Vec<String>),
}

impl UploadTarget {
    pub fn urls(&self) -> &[String] {
        match self {
            UploadTarget::Single(url) => std::slice::from_ref(url),
            UploadTarget::Many(urls) => urls,
        }
    }
}

/// A unit of work carried in a queue message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    #[serde(default)]
    pub voice: Option<String>,
    pub script_section: String,
    pub section_index: u32,
    pub upload_url: UploadTarget,
}

impl Job {
    /// Parse and validate the JSON body of a queue message.
    pub fn from_message_body(body: &str) -> Result<Self, CoreError> {
        let job: Job = serde_json::from_str(body)?;
        if job.upload_url.urls().is_empty() {
            return Err(CoreError::Validation(format!(
                "job {} has no upload destination",
                job.id
            )));
        }
        Ok(job)
    }

    /// Project the job onto the backend request shape.
    pub fn generation_request(&self) -> GenerationRequest {
        GenerationRequest {
            text: self.script_section.clone(),
            voice_preset: self.voice.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Backend request
// ---------------------------------------------------------------------------

/// Body of `POST /generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_preset: Option<String>,
}

impl GenerationRequest {
    /// Fixed canary request used once before the first real job.
    pub fn warm_up() -> Self {
        Self {
            text: WARMUP_TEXT.to_string(),
            voice_preset: Some(WARMUP_VOICE_PRESET.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Host snapshot taken once at startup and attached to every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    #[serde(rename = "vCPU")]
    pub vcpu: usize,
    #[serde(rename = "MemGB")]
    pub mem_gb: f64,
    pub gpu: String,
}

impl SystemInfo {
    /// Convert a byte count to gigabytes rounded to two decimals.
    pub fn bytes_to_gb(bytes: u64) -> f64 {
        (bytes as f64 / BYTES_PER_GB * 100.0).round() / 100.0
    }
}

/// Record posted to the reporting service for each completed job.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult<'a> {
    pub recipe_id: &'a JobId,
    pub script_section: &'a str,
    pub section_index: u32,
    /// Wall-clock generation time in milliseconds.
    pub inference_time: u64,
    pub output_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<&'a str>,
    pub system_info: &'a SystemInfo,
}

impl<'a> BenchmarkResult<'a> {
    /// Build the record for `job`, borrowing its identifying fields.
    pub fn new(
        job: &'a Job,
        inference_time: u64,
        output_url: &'a str,
        system_info: &'a SystemInfo,
    ) -> Self {
        Self {
            recipe_id: &job.id,
            script_section: &job.script_section,
            section_index: job.section_index,
            inference_time,
            output_url,
            voice: job.voice.as_deref(),
            system_info,
        }
    }
}
