//! Backend readiness polling.
//!
//! The backend can take minutes to load its model, so the worker polls
//! the health endpoint on a fixed cadence (not exponential backoff) up
//! to an attempt ceiling. The outcome is advisory: the caller proceeds
//! either way.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::backend::BackendClient;
use crate::config::WorkerConfig;

/// How [`ReadinessProbe::wait_until_ready`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A health check got a response on the given attempt.
    Ready { attempts: u32 },
    /// Every attempt failed.
    TimedOut,
    /// The stop signal was observed between attempts.
    Cancelled,
}

/// Polls the backend health endpoint at a fixed cadence.
pub struct ReadinessProbe {
    backend: BackendClient,
    max_attempts: u32,
    interval: Duration,
}

impl ReadinessProbe {
    /// Make at most `max_attempts` health checks, `interval` apart.
    pub fn new(backend: BackendClient, max_attempts: u32, interval: Duration) -> Self {
        Self {
            backend,
            max_attempts,
            interval,
        }
    }

    /// Take the attempt ceiling and interval from the configuration.
    pub fn from_config(backend: BackendClient, config: &WorkerConfig) -> Self {
        Self::new(
            backend,
            config.readiness_max_attempts,
            config.readiness_interval,
        )
    }

    /// Poll the health endpoint until it answers, the attempt ceiling is
    /// reached, or `cancel` fires.
    pub async fn wait_until_ready(&self, cancel: &CancellationToken) -> Readiness {
        let mut attempt = 0u32;

        while attempt < self.max_attempts {
            if cancel.is_cancelled() {
                return Readiness::Cancelled;
            }
            attempt += 1;

            match self.backend.health_check().await {
                Ok(status) => {
                    tracing::info!(attempt, status = %status.trim(), "Backend is reachable");
                    return Readiness::Ready { attempts: attempt };
                }
                Err(e) => {
                    tracing::info!(
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %e,
                        "Waiting for backend to start",
                    );
                }
            }

            if attempt == self.max_attempts {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Readiness::Cancelled,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::warn!(
            max_attempts = self.max_attempts,
            "Backend did not become reachable, continuing anyway",
        );
        Readiness::TimedOut
    }
}
