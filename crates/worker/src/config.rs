//! Worker configuration.
//!
//! [`WorkerConfig`] is built once at startup and handed to each
//! component by reference. Nothing reads the environment after that.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_BENCHMARK_SIZE: i64 = 10;
const DEFAULT_REPORTING_URL: &str = "http://localhost:3000";
const DEFAULT_AUTH_HEADER: &str = "Benchmark-Api-Key";
const DEFAULT_API_KEY: &str = "abc1234567890";
const DEFAULT_BENCHMARK_ID: &str = "bark-test";
const DEFAULT_QUEUE_URL: &str = "http://localhost:3001";
const DEFAULT_QUEUE_NAME: &str = "bark-test";

/// Backend boot time is bounded but can take minutes.
pub const DEFAULT_READINESS_MAX_ATTEMPTS: u32 = 300;
pub const DEFAULT_READINESS_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_EMPTY_QUEUE_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid auth header: {0}")]
    InvalidHeader(String),
}

/// How many jobs the worker processes before stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobLimit {
    Unbounded,
    /// `Count(0)` runs the warm-up submission only.
    Count(u64),
}

impl JobLimit {
    /// Negative sizes mean "run until interrupted".
    pub fn from_size(size: i64) -> Self {
        u64::try_from(size).map_or(JobLimit::Unbounded, JobLimit::Count)
    }

    /// Whether another job may be started after `processed` jobs.
    pub fn allows(&self, processed: u64) -> bool {
        match self {
            JobLimit::Unbounded => true,
            JobLimit::Count(n) => processed < *n,
        }
    }

    /// Throughput is only meaningful for a finite, positive run.
    pub fn reports_throughput(&self) -> bool {
        matches!(self, JobLimit::Count(n) if *n > 0)
    }
}

/// Static header attached to queue and reporting requests.
#[derive(Debug, Clone)]
pub struct AuthHeader {
    pub name: HeaderName,
    pub value: HeaderValue,
}

impl AuthHeader {
    pub fn new(name: &str, value: &str) -> Result<Self, ConfigError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ConfigError::InvalidHeader(format!("name '{name}': {e}")))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| ConfigError::InvalidHeader(format!("value for '{name}': {e}")))?;
        value.set_sensitive(true);
        Ok(Self { name, value })
    }
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the generation backend.
    pub server_url: String,
    pub job_limit: JobLimit,
    /// Base URL of the reporting service.
    pub reporting_url: String,
    pub auth: AuthHeader,
    /// Report channel, used as the reporting path.
    pub benchmark_id: String,
    pub queue_url: String,
    pub queue_name: String,
    pub readiness_max_attempts: u32,
    pub readiness_interval: Duration,
    pub empty_queue_backoff: Duration,
    /// How long to wait for outstanding pipelines on exit. `None` exits
    /// immediately and abandons them.
    pub drain_timeout: Option<Duration>,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `SERVER_URL`             | `http://127.0.0.1:8000` |
    /// | `BENCHMARK_SIZE`         | `10` (negative: no limit) |
    /// | `REPORTING_URL`          | `http://localhost:3000` |
    /// | `REPORTING_AUTH_HEADER`  | `Benchmark-Api-Key`     |
    /// | `REPORTING_API_KEY`      | `abc1234567890`         |
    /// | `BENCHMARK_ID`           | `bark-test`             |
    /// | `QUEUE_URL`              | `http://localhost:3001` |
    /// | `QUEUE_NAME`             | `bark-test`             |
    /// | `READINESS_MAX_ATTEMPTS` | `300`                   |
    /// | `READINESS_INTERVAL_MS`  | `1000`                  |
    /// | `EMPTY_QUEUE_BACKOFF_MS` | `1000`                  |
    /// | `DRAIN_TIMEOUT_SECS`     | `0` (do not wait)       |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_url = url_var(&lookup, "SERVER_URL", DEFAULT_SERVER_URL)?;
        let reporting_url = url_var(&lookup, "REPORTING_URL", DEFAULT_REPORTING_URL)?;
        let queue_url = url_var(&lookup, "QUEUE_URL", DEFAULT_QUEUE_URL)?;

        let size: i64 = parse_var(&lookup, "BENCHMARK_SIZE", DEFAULT_BENCHMARK_SIZE)?;

        let auth = AuthHeader::new(
            &string_var(&lookup, "REPORTING_AUTH_HEADER", DEFAULT_AUTH_HEADER),
            &string_var(&lookup, "REPORTING_API_KEY", DEFAULT_API_KEY),
        )?;

        let benchmark_id = non_empty_var(&lookup, "BENCHMARK_ID", DEFAULT_BENCHMARK_ID)?;
        let queue_name = non_empty_var(&lookup, "QUEUE_NAME", DEFAULT_QUEUE_NAME)?;

        let readiness_max_attempts = parse_var(
            &lookup,
            "READINESS_MAX_ATTEMPTS",
            DEFAULT_READINESS_MAX_ATTEMPTS,
        )?;
        let readiness_interval = Duration::from_millis(parse_var(
            &lookup,
            "READINESS_INTERVAL_MS",
            DEFAULT_READINESS_INTERVAL.as_millis() as u64,
        )?);
        let empty_queue_backoff = Duration::from_millis(parse_var(
            &lookup,
            "EMPTY_QUEUE_BACKOFF_MS",
            DEFAULT_EMPTY_QUEUE_BACKOFF.as_millis() as u64,
        )?);
        let drain_secs: u64 = parse_var(&lookup, "DRAIN_TIMEOUT_SECS", 0)?;

        Ok(Self {
            server_url,
            job_limit: JobLimit::from_size(size),
            reporting_url,
            auth,
            benchmark_id,
            queue_url,
            queue_name,
            readiness_max_attempts,
            readiness_interval,
            empty_queue_backoff,
            drain_timeout: (drain_secs > 0).then(|| Duration::from_secs(drain_secs)),
        })
    }
}

fn string_var<F>(lookup: &F, var: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var).unwrap_or_else(|| default.to_string())
}

fn non_empty_var<F>(lookup: &F, var: &'static str, default: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = string_var(lookup, var, default);
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid {
            var,
            value,
            reason: "must not be empty".into(),
        });
    }
    Ok(value)
}

fn url_var<F>(lookup: &F, var: &'static str, default: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = string_var(lookup, var, default);
    match reqwest::Url::parse(&value) {
        Ok(_) => Ok(value),
        Err(e) => Err(ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        }),
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
