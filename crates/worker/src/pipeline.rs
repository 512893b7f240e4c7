//! Detached post-processing of completed jobs.
//!
//! For each generated artifact the pipeline runs, strictly in order:
//!
//! 1. upload the payload to the job's pre-signed destination(s),
//! 2. report a [`BenchmarkResult`] carrying the stripped output URL,
//! 3. acknowledge (delete) the originating queue message.
//!
//! A failed step stops the chain, so a message is never deleted before
//! its artifact is uploaded and reported. A job with no destination at all
//! fails before any step runs. Failures are logged and never surfaced to
//! the controller; the message is simply redelivered later. The
//! acknowledgement only checks the response status.
//!
//! [`PostProcessor::launch`] spawns the chain on a [`TaskTracker`] and
//! returns immediately, so the worker can start the next generation while
//! network-bound post-processing overlaps with it. Pipelines of different
//! jobs may interleave or finish out of order.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::task::TaskTracker;
use voxbench_core::types::{BenchmarkResult, Job, JobId, SystemInfo};

use crate::queue::{QueueClient, QueueError};
use crate::report::{ReportClient, ReportError};
use crate::storage::{StorageClient, UploadError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Job {0} has no upload destination")]
    NoDestination(JobId),

    #[error("Upload to {url} failed: {source}")]
    Upload {
        url: String,
        #[source]
        source: UploadError,
    },

    #[error("Report failed: {0}")]
    Report(#[from] ReportError),

    #[error("Acknowledge failed: {0}")]
    Acknowledge(#[from] QueueError),
}

/// A generated artifact together with everything needed to finish it.
#[derive(Debug, Clone)]
pub struct CompletedJob {
    /// Queue delivery handle of the originating message.
    pub message_id: String,
    pub job: Job,
    pub payload: Bytes,
    pub inference_time: Duration,
}

struct Steps {
    storage: StorageClient,
    reporter: ReportClient,
    queue: QueueClient,
    system_info: Arc<SystemInfo>,
}

/// Launches and tracks post-processing pipelines.
#[derive(Clone)]
pub struct PostProcessor {
    steps: Arc<Steps>,
    tracker: TaskTracker,
}

impl PostProcessor {
    pub fn new(
        storage: StorageClient,
        reporter: ReportClient,
        queue: QueueClient,
        system_info: Arc<SystemInfo>,
    ) -> Self {
        Self {
            steps: Arc::new(Steps {
                storage,
                reporter,
                queue,
                system_info,
            }),
            tracker: TaskTracker::new(),
        }
    }

    /// Spawn the pipeline for `completed` without waiting for it.
    pub fn launch(&self, completed: CompletedJob) {
        let steps = Arc::clone(&self.steps);
        self.tracker.spawn(async move {
            let message_id = completed.message_id.clone();
            let job_id = completed.job.id.clone();
            if let Err(e) = steps.run(completed).await {
                tracing::error!(
                    job_id = %job_id,
                    message_id = %message_id,
                    error = %e,
                    "Post-processing failed, message left for redelivery",
                );
            }
        });
    }

    /// Run the pipeline for `completed` to completion on the current task.
    pub async fn process(&self, completed: CompletedJob) -> Result<String, PipelineError> {
        self.steps.run(completed).await
    }

    /// Number of launched pipelines that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting pipelines and wait up to `timeout` for the ones in
    /// flight. Returns `true` if all of them finished.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok()
    }
}

impl Steps {
    async fn run(&self, completed: CompletedJob) -> Result<String, PipelineError> {
        let CompletedJob {
            message_id,
            job,
            payload,
            inference_time,
        } = completed;

        let mut output_url = None;
        for url in job.upload_url.urls() {
            let uploaded = self
                .storage
                .upload(payload.clone(), url)
                .await
                .map_err(|source| PipelineError::Upload {
                    url: url.clone(),
                    source,
                })?;
            if output_url.is_none() {
                output_url = Some(uploaded);
            }
        }
        let Some(output_url) = output_url else {
            return Err(PipelineError::NoDestination(job.id));
        };

        let inference_ms = inference_time.as_millis() as u64;
        let result = BenchmarkResult::new(&job, inference_ms, &output_url, &self.system_info);
        self.reporter.record(&result).await?;

        tracing::info!(
            job_id = %job.id,
            text = %job.script_section,
            inference_ms,
            output_url = %output_url,
            "Job complete",
        );

        self.queue.acknowledge(&message_id).await?;
        tracing::debug!(message_id = %message_id, "Message acknowledged");
        Ok(output_url)
    }
}
