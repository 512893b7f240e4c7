//! Worker loop controller.
//!
//! [`Worker::run`] drives the worker through its lifecycle:
//!
//! ```text
//! Idle -> WaitingForReadiness -> WarmingUp -> Running -> Draining -> Stopped
//! ```
//!
//! While `Running` it repeatedly fetches one job, submits it to the
//! backend and hands the result to a detached post-processing pipeline.
//! The submission is awaited inline, so at most one generation request
//! is ever in flight. The stop signal is checked at the top of each
//! iteration only; an in-flight fetch or submission always completes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use voxbench_core::types::GenerationRequest;

use crate::backend::{BackendClient, BackendError};
use crate::collector::{CollectorError, SystemInfoSource};
use crate::config::WorkerConfig;
use crate::pipeline::{CompletedJob, PostProcessor};
use crate::queue::QueueClient;
use crate::readiness::{Readiness, ReadinessProbe};
use crate::report::ReportClient;
use crate::storage::StorageClient;

/// Lifecycle state of a [`Worker`], in the order a run passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkerState {
    Idle,
    WaitingForReadiness,
    WarmingUp,
    Running,
    Draining,
    Stopped,
}

/// Errors that terminate the worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("System introspection failed: {0}")]
    SystemInfo(#[from] CollectorError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub readiness: Readiness,
    /// Time from startup until the warm-up submission returned. `None`
    /// when the worker was stopped before warming up.
    pub warm_time: Option<Duration>,
    pub processed: u64,
    /// Wall time spent in the job loop.
    pub elapsed: Duration,
    /// Pipelines still running when the worker stopped.
    pub outstanding_pipelines: usize,
}

impl RunSummary {
    pub fn average(&self) -> Option<Duration> {
        (self.processed > 0)
            .then(|| Duration::from_secs_f64(self.elapsed.as_secs_f64() / self.processed as f64))
    }
}

pub struct Worker {
    config: WorkerConfig,
    backend: BackendClient,
    queue: QueueClient,
    reporter: ReportClient,
    storage: StorageClient,
    cancel: CancellationToken,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    /// Build a worker whose clients share one connection pool.
    pub fn new(config: WorkerConfig, cancel: CancellationToken) -> Self {
        let client = reqwest::Client::new();
        let (state, _) = watch::channel(WorkerState::Idle);

        Self {
            backend: BackendClient::with_client(client.clone(), config.server_url.clone()),
            queue: QueueClient::from_config(client.clone(), &config),
            reporter: ReportClient::from_config(client.clone(), &config),
            storage: StorageClient::new(client),
            config,
            cancel,
            state,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Current state.
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Run the worker until the job limit is reached or the stop signal
    /// fires.
    ///
    /// Fails fast if the system snapshot cannot be taken, and stops on
    /// the first backend rejection.
    pub async fn run(&self, source: &dyn SystemInfoSource) -> Result<RunSummary, WorkerError> {
        let result = self.run_stages(source).await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Worker stopping on fatal error");
            self.transition(WorkerState::Stopped);
        }
        result
    }

    async fn run_stages(&self, source: &dyn SystemInfoSource) -> Result<RunSummary, WorkerError> {
        let system_info = Arc::new(source.snapshot()?);
        let load_start = Instant::now();

        self.transition(WorkerState::WaitingForReadiness);
        let readiness = ReadinessProbe::from_config(self.backend.clone(), &self.config)
            .wait_until_ready(&self.cancel)
            .await;

        let pipelines = PostProcessor::new(
            self.storage.clone(),
            self.reporter.clone(),
            self.queue.clone(),
            system_info,
        );

        let mut warm_time = None;
        let mut processed = 0;
        let mut elapsed = Duration::ZERO;

        if !self.cancel.is_cancelled() {
            self.transition(WorkerState::WarmingUp);
            self.backend.generate(&GenerationRequest::warm_up()).await?;
            let warm = load_start.elapsed();
            tracing::info!(warm_ms = warm.as_millis() as u64, "Backend fully warm");
            warm_time = Some(warm);

            self.transition(WorkerState::Running);
            let start = Instant::now();
            processed = self.process_jobs(&pipelines).await?;
            elapsed = start.elapsed();
        }

        self.transition(WorkerState::Draining);
        if let Some(timeout) = self.config.drain_timeout {
            if !pipelines.drain(timeout).await {
                tracing::warn!(
                    outstanding = pipelines.outstanding(),
                    timeout_secs = timeout.as_secs(),
                    "Timed out waiting for post-processing to finish",
                );
            }
        }
        let outstanding_pipelines = pipelines.outstanding();
        self.transition(WorkerState::Stopped);

        Ok(RunSummary {
            readiness,
            warm_time,
            processed,
            elapsed,
            outstanding_pipelines,
        })
    }

    /// The job loop. Returns the number of jobs submitted successfully.
    async fn process_jobs(&self, pipelines: &PostProcessor) -> Result<u64, WorkerError> {
        let mut processed = 0u64;

        while !self.cancel.is_cancelled() && self.config.job_limit.allows(processed) {
            tracing::debug!("Fetching job");
            let (message, job) = match self.queue.fetch_next().await {
                Ok(Some(found)) => found,
                Ok(None) => {
                    tracing::debug!("No jobs available, waiting");
                    self.backoff().await;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to fetch job, retrying");
                    self.backoff().await;
                    continue;
                }
            };

            tracing::info!(job_id = %job.id, message_id = %message.message_id, "Submitting job");
            let started = Instant::now();
            let payload = self.backend.generate(&job.generation_request()).await?;
            let inference_time = started.elapsed();
            processed += 1;

            tracing::info!(
                job_id = %job.id,
                inference_ms = inference_time.as_millis() as u64,
                processed,
                "Clip generated",
            );

            pipelines.launch(CompletedJob {
                message_id: message.message_id,
                job,
                payload,
                inference_time,
            });
        }

        Ok(processed)
    }

    async fn backoff(&self) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.empty_queue_backoff) => {}
        }
    }

    fn transition(&self, next: WorkerState) {
        tracing::info!(state = ?next, "Worker state changed");
        self.state.send_replace(next);
    }
}
