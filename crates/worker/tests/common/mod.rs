//! In-process fake of the services the worker talks to.
//!
//! One axum server on an ephemeral port plays all four roles:
//!
//! | Path                        | Role                  |
//! |-----------------------------|-----------------------|
//! | `GET /hc`, `POST /generate` | generation backend    |
//! | `/queue/bark-test[/{id}]`   | message queue         |
//! | `PUT /storage/...`          | pre-signed storage    |
//! | `POST /reports/bark-test`   | reporting service     |
//!
//! Every request is appended to an event log so tests can assert on
//! ordering across the pipeline.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use voxbench_core::types::SystemInfo;
use voxbench_worker::config::{AuthHeader, JobLimit, WorkerConfig};

pub const QUEUE_NAME: &str = "bark-test";
pub const AUTH_HEADER: &str = "benchmark-api-key";
pub const API_KEY: &str = "test-key";
pub const AUDIO: &[u8] = b"ID3-fake-audio";

/// A request observed by the fake.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Health,
    Generate(Value),
    Fetch,
    /// Raw (still percent-encoded) request path.
    Delete(String),
    /// Path and query of the upload target.
    Upload(String),
    Report(Value),
}

/// Where fetched messages come from.
pub enum Messages {
    /// A fixed list of `(message_id, body)` pairs, then empty. `{base}`
    /// in a body is replaced with the fake's own base URL.
    Fixed(Vec<(String, String)>),
    /// A fresh job for every fetch: `m1`, `m2`, ...
    Endless,
}

pub struct FakeConfig {
    pub messages: Messages,
    /// Number of empty responses served before any message.
    pub empty_fetches: usize,
    pub health_status: StatusCode,
    pub generate_delay: Duration,
    pub upload_delay: Duration,
    /// Generation requests with this text get a 500.
    pub reject_text: Option<String>,
    pub fail_uploads: bool,
    /// Status for acknowledgements. `200` carries a JSON confirmation,
    /// anything else an empty body.
    pub delete_status: StatusCode,
    /// Cancel the token when the n-th generation request arrives.
    pub cancel_on_generate: Option<(usize, CancellationToken)>,
}

impl Default for FakeConfig {
    fn default() -> Self {
        Self {
            messages: Messages::Endless,
            empty_fetches: 0,
            health_status: StatusCode::OK,
            generate_delay: Duration::ZERO,
            upload_delay: Duration::ZERO,
            reject_text: None,
            fail_uploads: false,
            delete_status: StatusCode::OK,
            cancel_on_generate: None,
        }
    }
}

struct FakeState {
    addr: SocketAddr,
    config: FakeConfig,
    fixed: Mutex<VecDeque<(String, String)>>,
    empty_left: AtomicUsize,
    next_job: AtomicUsize,
    generates: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    events: Mutex<Vec<Event>>,
}

pub struct FakeServices {
    pub addr: SocketAddr,
    state: Arc<FakeState>,
}

impl FakeServices {
    pub async fn start(mut config: FakeConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let fixed = match &mut config.messages {
            Messages::Fixed(list) => std::mem::take(list).into(),
            Messages::Endless => VecDeque::new(),
        };

        let state = Arc::new(FakeState {
            addr,
            empty_left: AtomicUsize::new(config.empty_fetches),
            config,
            fixed: Mutex::new(fixed),
            next_job: AtomicUsize::new(1),
            generates: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Worker configuration pointing every client at this fake, with
    /// short cadences.
    pub fn worker_config(&self, job_limit: JobLimit) -> WorkerConfig {
        WorkerConfig {
            server_url: self.url(""),
            job_limit,
            reporting_url: self.url("/reports"),
            auth: AuthHeader::new("Benchmark-Api-Key", API_KEY).unwrap(),
            benchmark_id: QUEUE_NAME.to_string(),
            queue_url: self.url("/queue"),
            queue_name: QUEUE_NAME.to_string(),
            readiness_max_attempts: 5,
            readiness_interval: Duration::from_millis(10),
            empty_queue_backoff: Duration::from_millis(50),
            drain_timeout: Some(Duration::from_secs(5)),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.events.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|e| matches(e)).count()
    }

    pub fn generate_bodies(&self) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Generate(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Index of the first event matching `matches`.
    pub fn position(&self, matches: impl Fn(&Event) -> bool) -> Option<usize> {
        self.events().iter().position(matches)
    }

    /// Poll the event log until `done` holds or five seconds pass.
    pub async fn wait_until(&self, done: impl Fn(&[Event]) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !done(&self.events()) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for events, got {:?}",
                self.events()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub fn system_info() -> SystemInfo {
    SystemInfo {
        vcpu: 8,
        mem_gb: 31.27,
        gpu: "NVIDIA A10G".into(),
    }
}

pub fn job_body(id: usize, voice: &str, text: &str, upload_url: &str) -> String {
    json!({
        "id": id,
        "voice": voice,
        "script_section": text,
        "section_index": id - 1,
        "upload_url": upload_url,
    })
    .to_string()
}

async fn handle(
    State(fake): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let queue_path = format!("/queue/{QUEUE_NAME}");
    let authorized = headers
        .get(AUTH_HEADER)
        .is_some_and(|v| v.as_bytes() == API_KEY.as_bytes());

    match (method, path.as_str()) {
        (Method::GET, "/hc") => {
            fake.record(Event::Health);
            (fake.config.health_status, "ok").into_response()
        }
        (Method::POST, "/generate") => fake.generate(&body).await,
        (Method::GET, p) if p == queue_path => {
            if !authorized {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            fake.record(Event::Fetch);
            Json(fake.next_fetch()).into_response()
        }
        (Method::DELETE, p) if p.starts_with(&format!("{queue_path}/")) => {
            if !authorized {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            fake.record(Event::Delete(path.clone()));
            match fake.config.delete_status {
                StatusCode::OK => Json(json!({ "message": "Message deleted" })).into_response(),
                status => status.into_response(),
            }
        }
        (Method::PUT, p) if p.starts_with("/storage/") => {
            tokio::time::sleep(fake.config.upload_delay).await;
            let target = match uri.query() {
                Some(q) => format!("{path}?{q}"),
                None => path.clone(),
            };
            fake.record(Event::Upload(target));
            assert_eq!(&body[..], AUDIO);
            assert_eq!(headers.get("content-type").unwrap(), "audio/mpeg");
            if fake.config.fail_uploads {
                return (StatusCode::FORBIDDEN, "signature expired").into_response();
            }
            StatusCode::OK.into_response()
        }
        (Method::POST, "/reports/bark-test") => {
            if !authorized {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            let report: Value = serde_json::from_slice(&body).unwrap();
            fake.record(Event::Report(report));
            StatusCode::CREATED.into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

impl FakeState {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    async fn generate(&self, body: &Bytes) -> Response {
        let request: Value = serde_json::from_slice(body).unwrap();
        self.record(Event::Generate(request.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.config.generate_delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let n = self.generates.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((at, cancel)) = &self.config.cancel_on_generate {
            if n == *at {
                cancel.cancel();
            }
        }

        let rejected = self
            .config
            .reject_text
            .as_deref()
            .is_some_and(|text| request["text"].as_str() == Some(text));
        if rejected {
            return (StatusCode::INTERNAL_SERVER_ERROR, "model crashed").into_response();
        }
        AUDIO.into_response()
    }

    fn next_fetch(&self) -> Value {
        let empty = json!({ "status": "ok", "messages": [] });

        let took_empty = self
            .empty_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took_empty {
            return empty;
        }

        let message = match self.config.messages {
            Messages::Fixed(_) => {
                let base = format!("http://{}", self.addr);
                self.fixed
                    .lock()
                    .unwrap()
                    .pop_front()
                    .map(|(id, body)| (id, body.replace("{base}", &base)))
            }
            Messages::Endless => {
                let n = self.next_job.fetch_add(1, Ordering::SeqCst);
                let upload = format!("http://{}/storage/clip-{n}.mp3?sig={n}", self.addr);
                Some((format!("m{n}"), job_body(n, "v2/en_speaker_1", &format!("line {n}"), &upload)))
            }
        };

        match message {
            Some((id, body)) => json!({
                "status": "ok",
                "messages": [{ "messageId": id, "body": body }],
            }),
            None => empty,
        }
    }
}
