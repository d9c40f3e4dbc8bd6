//! In-process fake worker fleet for bridge client tests.
//!
//! Each route replays a scripted list of replies and then repeats its
//! fallback reply. Every request is recorded so tests can inspect headers,
//! bodies and the capability tokens that were sent.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};

use aidi_fleet::config::{DEFAULT_TOKEN_ISSUER, DEFAULT_TOKEN_TTL};
use aidi_fleet::token::{CapabilityClaims, TokenIssuer};
use aidi_fleet::{BridgeConfig, RetryPolicy};

pub const SECRET: &str = "fleet-test-secret-that-is-long-enough";
pub const PUBLIC_BASE_URL: &str = "https://app.example.com";
pub const EXPECTED_CALLBACK: &str = "https://app.example.com/api/v1/bridge/callback";

// ---------------------------------------------------------------------------
// Scripted replies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn text(status: StatusCode, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn render(self) -> Response {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.status, [(CONTENT_TYPE, "application/json")], self.body).into_response()
    }
}

struct Script {
    queued: VecDeque<Reply>,
    fallback: Reply,
}

impl Script {
    fn new(fallback: Reply) -> Self {
        Self {
            queued: VecDeque::new(),
            fallback,
        }
    }

    fn next(&mut self) -> Reply {
        self.queued
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

// ---------------------------------------------------------------------------
// Recorded traffic
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Recorded {
    pub headers: HeaderMap,
    pub body: Value,
}

impl Recorded {
    pub fn bearer(&self) -> Option<String> {
        self.headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Decode the bearer token the way the fleet would.
    pub fn claims(&self) -> CapabilityClaims {
        let token = self.bearer().expect("request should carry a bearer token");
        verifier()
            .verify(&token)
            .expect("token should verify with the shared secret")
    }
}

// ---------------------------------------------------------------------------
// FakeFleet
// ---------------------------------------------------------------------------

pub struct FakeFleet {
    enqueue: Mutex<Script>,
    status: Mutex<Script>,
    health: Mutex<Script>,
    enqueue_calls: Mutex<Vec<Recorded>>,
    status_calls: Mutex<Vec<Recorded>>,
    health_calls: Mutex<Vec<Recorded>>,
}

pub fn accepted(job_id: &str, queue_position: u64) -> Reply {
    Reply::json(
        StatusCode::OK,
        json!({
            "success": true,
            "jobId": job_id,
            "queuePosition": queue_position,
            "estimatedStartTime": "2026-01-05T10:00:00Z",
        }),
    )
}

pub fn sample_metrics() -> Value {
    json!({
        "waiting": 4,
        "active": 1,
        "completed": 100,
        "failed": 2,
        "delayed": 0,
        "processingRate": 3.2,
        "averageProcessingTime": 1500,
    })
}

impl FakeFleet {
    /// A healthy fleet that accepts every job.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            enqueue: Mutex::new(Script::new(accepted("job-1", 0))),
            status: Mutex::new(Script::new(Reply::json(
                StatusCode::OK,
                json!({ "success": true, "metrics": sample_metrics() }),
            ))),
            health: Mutex::new(Script::new(Reply::json(
                StatusCode::OK,
                json!({ "status": "healthy", "timestamp": "2026-01-05T10:00:00Z" }),
            ))),
            enqueue_calls: Mutex::new(Vec::new()),
            status_calls: Mutex::new(Vec::new()),
            health_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn script_enqueue(&self, replies: Vec<Reply>, fallback: Reply) {
        let mut script = self.enqueue.lock().unwrap();
        script.queued = replies.into();
        script.fallback = fallback;
    }

    pub fn script_status(&self, replies: Vec<Reply>, fallback: Reply) {
        let mut script = self.status.lock().unwrap();
        script.queued = replies.into();
        script.fallback = fallback;
    }

    pub fn script_health(&self, fallback: Reply) {
        self.health.lock().unwrap().fallback = fallback;
    }

    pub fn enqueue_calls(&self) -> Vec<Recorded> {
        self.enqueue_calls.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> Vec<Recorded> {
        self.status_calls.lock().unwrap().clone()
    }

    pub fn health_calls(&self) -> Vec<Recorded> {
        self.health_calls.lock().unwrap().clone()
    }
}

async fn enqueue_handler(
    State(fleet): State<Arc<FakeFleet>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let body = serde_json::from_str(&body).unwrap_or(Value::Null);
    fleet
        .enqueue_calls
        .lock()
        .unwrap()
        .push(Recorded { headers, body });
    let reply = fleet.enqueue.lock().unwrap().next();
    reply.render().await
}

async fn status_handler(State(fleet): State<Arc<FakeFleet>>, headers: HeaderMap) -> Response {
    fleet.status_calls.lock().unwrap().push(Recorded {
        headers,
        body: Value::Null,
    });
    let reply = fleet.status.lock().unwrap().next();
    reply.render().await
}

async fn health_handler(State(fleet): State<Arc<FakeFleet>>, headers: HeaderMap) -> Response {
    fleet.health_calls.lock().unwrap().push(Recorded {
        headers,
        body: Value::Null,
    });
    let reply = fleet.health.lock().unwrap().next();
    reply.render().await
}

/// Serve the fake fleet on an ephemeral port and return its base URL.
pub async fn start_fake_fleet(fleet: Arc<FakeFleet>) -> String {
    let app = Router::new()
        .route("/queue/enqueue", post(enqueue_handler))
        .route("/queue/status", get(status_handler))
        .route("/health", get(health_handler))
        .with_state(fleet);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr: SocketAddr = listener.local_addr().expect("listener addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve fake fleet");
    });

    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Short backoff so retry tests stay fast on a real clock.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff: vec![
            Duration::from_millis(50),
            Duration::from_millis(100),
            Duration::from_millis(200),
        ],
        attempt_timeout: Duration::from_secs(2),
    }
}

pub fn bridge_config(fleet_base_url: &str) -> BridgeConfig {
    BridgeConfig::new(fleet_base_url, PUBLIC_BASE_URL)
        .with_signing_secret(SECRET)
        .with_retry(fast_retry())
}

pub fn verifier() -> TokenIssuer {
    TokenIssuer::new(Some(SECRET), DEFAULT_TOKEN_ISSUER, DEFAULT_TOKEN_TTL)
}
