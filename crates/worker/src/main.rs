//! `voxbench-worker` -- queue-driven generation benchmark worker.
//!
//! Waits for the generation backend to come up, warms it with one
//! request, then drains jobs from the queue: generate, upload, report,
//! acknowledge. Configuration is read from the environment (and an
//! optional `.env` file); see [`WorkerConfig::from_env`].
//!
//! SIGINT / SIGTERM stop the worker after the current iteration.

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxbench_worker::collector::SystemInfoCollector;
use voxbench_worker::config::WorkerConfig;
use voxbench_worker::controller::Worker;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    init_tracing();

    let config = WorkerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        server_url = %config.server_url,
        queue_url = %config.queue_url,
        queue_name = %config.queue_name,
        reporting_url = %config.reporting_url,
        benchmark_id = %config.benchmark_id,
        job_limit = ?config.job_limit,
        "Starting voxbench-worker",
    );

    let cancel = CancellationToken::new();
    tokio::spawn(stop_on_signal(cancel.clone()));

    let job_limit = config.job_limit;
    let worker = Worker::new(config, cancel);

    let summary = match worker.run(&SystemInfoCollector::new()).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "Worker failed");
            std::process::exit(1);
        }
    };

    if job_limit.reports_throughput() {
        tracing::info!(
            processed = summary.processed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            average_ms = summary.average().map(|d| d.as_millis() as u64),
            "Benchmark complete",
        );
    }

    if summary.outstanding_pipelines > 0 {
        tracing::warn!(
            outstanding = summary.outstanding_pipelines,
            "Exiting with post-processing still in flight; those messages will be redelivered",
        );
    }
}

/// `LOG_FORMAT=json` switches to JSON lines; `RUST_LOG` overrides the
/// default filter.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "voxbench_worker=info,voxbench_core=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Cancel `cancel` on SIGINT (Ctrl-C) or, on Unix, SIGTERM.
///
/// The worker observes the token at the top of its loop, so the current
/// fetch or submission finishes before it stops.
async fn stop_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), stopping after the current job");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, stopping after the current job");
        }
    }

    cancel.cancel();
}
