#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aidi_api::config::ServerConfig;
use aidi_api::router::build_app_router;
use aidi_api::state::AppState;
use aidi_api::status::{EvaluationStatusSink, StatusSinkError};
use aidi_core::dispatch::{DispatchOutcome, DispatchRequest};
use aidi_core::queue::{FleetHealth, QueueMetrics};
use aidi_fleet::retry::AttemptError;
use aidi_fleet::{BridgeConfig, BridgeError, FleetBridge, FleetError};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Fake bridge
// ---------------------------------------------------------------------------

/// Produces a fresh error per call; `BridgeError` is not `Clone`.
pub type ErrorFactory = fn() -> BridgeError;

/// In-memory [`FleetBridge`] that records every dispatched request.
#[derive(Default)]
pub struct FakeBridge {
    dispatch_error: Mutex<Option<ErrorFactory>>,
    metrics_error: Mutex<Option<ErrorFactory>>,
    health_error: Mutex<Option<ErrorFactory>>,
    dispatch_delay: Mutex<Duration>,
    dispatched: Mutex<Vec<DispatchRequest>>,
    metrics_calls: AtomicUsize,
    health_calls: AtomicUsize,
}

impl FakeBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_dispatch(&self, error: ErrorFactory) {
        *self.dispatch_error.lock().unwrap() = Some(error);
    }

    /// Make every dispatch take this long before the fleet answers.
    pub fn delay_dispatch(&self, delay: Duration) {
        *self.dispatch_delay.lock().unwrap() = delay;
    }

    pub fn fail_metrics(&self, error: ErrorFactory) {
        *self.metrics_error.lock().unwrap() = Some(error);
    }

    pub fn fail_health(&self, error: ErrorFactory) {
        *self.health_error.lock().unwrap() = Some(error);
    }

    pub fn dispatched(&self) -> Vec<DispatchRequest> {
        self.dispatched.lock().unwrap().clone()
    }

    pub fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FleetBridge for FakeBridge {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, BridgeError> {
        let delay = *self.dispatch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.dispatched.lock().unwrap().push(request.clone());
        if let Some(make) = *self.dispatch_error.lock().unwrap() {
            return Err(make());
        }
        Ok(sample_outcome())
    }

    async fn queue_metrics(&self) -> Result<QueueMetrics, BridgeError> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(make) = *self.metrics_error.lock().unwrap() {
            return Err(make());
        }
        Ok(sample_metrics())
    }

    async fn health_check(&self) -> Result<FleetHealth, BridgeError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(make) = *self.health_error.lock().unwrap() {
            return Err(make());
        }
        Ok(FleetHealth {
            status: "healthy".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap(),
        })
    }
}

pub fn sample_outcome() -> DispatchOutcome {
    DispatchOutcome {
        job_id: "job-42".to_string(),
        queue_position: 2,
        estimated_start_time: Some(Utc.with_ymd_and_hms(2026, 1, 5, 10, 5, 0).unwrap()),
    }
}

pub fn sample_metrics() -> QueueMetrics {
    serde_json::from_value(serde_json::json!({
        "waiting": 4,
        "active": 1,
        "completed": 100,
        "failed": 2,
        "delayed": 0,
        "processingRate": 3.2,
        "averageProcessingTime": 1500.0,
    }))
    .unwrap()
}

// ---------------------------------------------------------------------------
// Canned bridge failures
// ---------------------------------------------------------------------------

pub fn exhausted_http_500() -> BridgeError {
    BridgeError::ExhaustedRetries {
        attempts: 3,
        last: AttemptError::Failed(FleetError::HttpStatus { status: 500 }),
    }
}

pub fn exhausted_timeout() -> BridgeError {
    BridgeError::ExhaustedRetries {
        attempts: 3,
        last: AttemptError::TimedOut(Duration::from_secs(10)),
    }
}

/// A real `reqwest::Error`, built without touching the network.
pub fn exhausted_network() -> BridgeError {
    let err = reqwest::Client::new()
        .get("not a url")
        .build()
        .expect_err("an invalid URL fails to build");
    BridgeError::ExhaustedRetries {
        attempts: 3,
        last: AttemptError::Failed(FleetError::Request(err)),
    }
}

pub fn rejected_403() -> BridgeError {
    BridgeError::Rejected {
        status: 403,
        code: Some("UNAUTHORIZED_AGENTS".to_string()),
        message: "Agents not allowed: rogue".to_string(),
    }
}

pub fn missing_secret() -> BridgeError {
    BridgeError::Configuration("BRIDGE_SIGNING_SECRET is not set".to_string())
}

// ---------------------------------------------------------------------------
// Recording status sink
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Processing { evaluation_id: String, job_id: String },
    Failed { evaluation_id: String, reason: String },
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    broken: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every update fail after recording it.
    pub fn break_it(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: SinkEvent) -> Result<(), StatusSinkError> {
        self.events.lock().unwrap().push(event);
        if self.broken.load(Ordering::SeqCst) {
            return Err(StatusSinkError("evaluation store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EvaluationStatusSink for RecordingSink {
    async fn mark_processing(
        &self,
        evaluation_id: &str,
        outcome: &DispatchOutcome,
    ) -> Result<(), StatusSinkError> {
        self.record(SinkEvent::Processing {
            evaluation_id: evaluation_id.to_string(),
            job_id: outcome.job_id.clone(),
        })
    }

    async fn mark_dispatch_failed(
        &self,
        evaluation_id: &str,
        reason: &str,
    ) -> Result<(), StatusSinkError> {
        self.record(SinkEvent::Failed {
            evaluation_id: evaluation_id.to_string(),
            reason: reason.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 60,
        development_mode: false,
        bridge_enabled: true,
        bridge: BridgeConfig::new("http://fleet.test", "https://app.example.com")
            .with_signing_secret("api-test-secret"),
    }
}

pub struct TestApp {
    pub router: Router,
    pub bridge: Arc<FakeBridge>,
    pub sink: Arc<RecordingSink>,
}

/// Build the full application router around a fake bridge and sink.
pub fn build_test_app_with(config: ServerConfig) -> TestApp {
    let bridge = FakeBridge::new();
    let sink = RecordingSink::new();

    let state = AppState {
        config: Arc::new(config.clone()),
        bridge: Arc::clone(&bridge) as Arc<dyn FleetBridge>,
        status_sink: Arc::clone(&sink) as Arc<dyn EvaluationStatusSink>,
    };

    TestApp {
        router: build_app_router(state, &config),
        bridge,
        sink,
    }
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(test_config())
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub const ENQUEUE: &str = "/api/v1/bridge/enqueue";

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(
        app,
        Request::builder().uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

pub async fn post_json(app: Router, uri: &str, body: &str) -> Response<Body> {
    send(
        app,
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// The dispatch body used across tests.
pub fn scenario_body() -> String {
    serde_json::json!({
        "evaluationId": "e1",
        "targetUrl": "https://example.com",
        "serviceTier": "pro",
        "agents": ["schema", "citation"],
    })
    .to_string()
}
