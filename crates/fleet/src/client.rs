//! HTTP client for the worker fleet's queue API.
//!
//! [`BridgeClient`] is constructed once at startup and shared by handle. It
//! holds no per-call mutable state, so concurrent dispatches never contend.
//!
//! Wire contract:
//!
//! ```text
//! POST {fleet}/queue/enqueue   Bearer token, X-Request-ID, JSON body
//! GET  {fleet}/queue/status    Bearer token           -> { metrics }
//! GET  {fleet}/health          no auth                -> { status, timestamp }
//! ```

use std::time::Duration;

use aidi_core::dispatch::{DispatchOutcome, DispatchRequest};
use aidi_core::queue::{FleetHealth, QueueMetrics};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, FleetError};
use crate::retry::{AttemptError, RetryExecutor};
use crate::token::{TokenIssuer, METRICS_SCOPE_ID, NON_ACTIONABLE_CALLBACK};

const ENQUEUE_PATH: &str = "/queue/enqueue";
const STATUS_PATH: &str = "/queue/status";
const HEALTH_PATH: &str = "/health";

/// Lifetime of the read-only token used for queue metrics.
const METRICS_TOKEN_TTL: Duration = Duration::from_secs(300);

/// Operations the web tier needs from the fleet.
///
/// Handlers depend on this trait rather than on [`BridgeClient`] so tests can
/// substitute a fake.
#[async_trait]
pub trait FleetBridge: Send + Sync {
    /// Submit one evaluation to the fleet's queue.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, BridgeError>;

    /// Current queue counts. Not cached.
    async fn queue_metrics(&self) -> Result<QueueMetrics, BridgeError>;

    /// Single unauthenticated liveness probe. Never retried.
    async fn health_check(&self) -> Result<FleetHealth, BridgeError>;
}

/// Enqueue body: the request plus the bridge-computed callback and token.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnqueueBody<'a> {
    #[serde(flatten)]
    request: &'a DispatchRequest,
    callback_url: &'a str,
    auth_token: &'a str,
}

#[derive(Deserialize)]
struct StatusEnvelope {
    metrics: QueueMetrics,
}

/// Best-effort error body on non-2xx answers.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug)]
pub struct BridgeClient {
    http: reqwest::Client,
    fleet_base_url: String,
    callback_url: String,
    tokens: TokenIssuer,
    retry: RetryExecutor,
}

impl BridgeClient {
    /// Build a client with its own connection pool.
    ///
    /// Fails with [`BridgeError::Configuration`] if either base URL is not
    /// an absolute URL or the retry policy is unusable. A missing signing
    /// secret is accepted here and reported by each token-issuing call.
    pub fn new(config: &BridgeConfig) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BridgeError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Self::with_client(http, config)
    }

    /// Build a client reusing an existing [`reqwest::Client`].
    pub fn with_client(http: reqwest::Client, config: &BridgeConfig) -> Result<Self, BridgeError> {
        for (name, value) in [
            ("fleet base URL", &config.fleet_base_url),
            ("public base URL", &config.public_base_url),
        ] {
            reqwest::Url::parse(value).map_err(|e| {
                BridgeError::Configuration(format!("{name} {value:?} is invalid: {e}"))
            })?;
        }
        config
            .retry
            .validate()
            .map_err(|e| BridgeError::Configuration(e.to_string()))?;

        let client = Self {
            http,
            fleet_base_url: config.fleet_base_url.trim_end_matches('/').to_string(),
            callback_url: config.callback_url(),
            tokens: TokenIssuer::from_config(config),
            retry: RetryExecutor::new(config.retry.clone()),
        };

        tracing::info!(
            fleet_base_url = %client.fleet_base_url,
            callback_url = %client.callback_url,
            tokens_configured = client.tokens.is_configured(),
            max_attempts = config.retry.max_attempts,
            "Bridge client initialized",
        );

        Ok(client)
    }

    /// The callback URL embedded in every dispatch.
    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Fails with [`BridgeError::Configuration`] when tokens cannot be minted.
    pub fn ensure_ready(&self) -> Result<(), BridgeError> {
        self.tokens.ensure_configured().map_err(BridgeError::from)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.fleet_base_url)
    }

    /// One enqueue attempt with a freshly minted token.
    async fn enqueue_once(
        &self,
        request: &DispatchRequest,
        request_id: &str,
        attempt: u32,
    ) -> Result<DispatchOutcome, FleetError> {
        let token = self.tokens.issue(
            request.evaluation_id(),
            request.agents(),
            &self.callback_url,
            None,
        )?;

        let body = EnqueueBody {
            request,
            callback_url: &self.callback_url,
            auth_token: &token,
        };

        tracing::debug!(
            evaluation_id = request.evaluation_id(),
            request_id,
            attempt,
            "Submitting enqueue request",
        );

        let response = self
            .http
            .post(self.url(ENQUEUE_PATH))
            .bearer_auth(&token)
            .header("X-Request-ID", request_id)
            .json(&body)
            .send()
            .await?;

        parse_response(response).await
    }

    async fn fetch_status(&self) -> Result<StatusEnvelope, FleetError> {
        let token = self.tokens.issue(
            METRICS_SCOPE_ID,
            &[],
            NON_ACTIONABLE_CALLBACK,
            Some(METRICS_TOKEN_TTL),
        )?;

        let response = self
            .http
            .get(self.url(STATUS_PATH))
            .bearer_auth(&token)
            .send()
            .await?;

        parse_response(response).await
    }

    async fn fetch_health(&self) -> Result<FleetHealth, FleetError> {
        let response = self.http.get(self.url(HEALTH_PATH)).send().await?;
        parse_response(response).await
    }
}

#[async_trait]
impl FleetBridge for BridgeClient {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchOutcome, BridgeError> {
        self.ensure_ready()?;

        // One correlation id for every attempt of this dispatch.
        let request_id = format!("bridge_{}", Uuid::new_v4());
        let request_id = request_id.as_str();

        tracing::info!(
            evaluation_id = request.evaluation_id(),
            agents = ?request.agents(),
            tier = %request.service_tier(),
            priority = %request.priority(),
            request_id,
            "Enqueueing evaluation to worker fleet",
        );

        let outcome = self
            .retry
            .run(|attempt| self.enqueue_once(request, request_id, attempt))
            .await
            .map_err(BridgeError::from)?;

        tracing::info!(
            evaluation_id = request.evaluation_id(),
            job_id = %outcome.job_id,
            queue_position = outcome.queue_position,
            request_id,
            "Evaluation accepted by worker fleet",
        );

        Ok(outcome)
    }

    async fn queue_metrics(&self) -> Result<QueueMetrics, BridgeError> {
        self.ensure_ready()?;

        let envelope = self
            .retry
            .run(|_| self.fetch_status())
            .await
            .map_err(BridgeError::from)?;

        Ok(envelope.metrics)
    }

    async fn health_check(&self) -> Result<FleetHealth, BridgeError> {
        let timeout = self.retry.policy().attempt_timeout;

        let failure = match tokio::time::timeout(timeout, self.fetch_health()).await {
            Ok(Ok(health)) => return Ok(health),
            Ok(Err(e)) => AttemptError::Failed(e),
            Err(_elapsed) => AttemptError::TimedOut(timeout),
        };

        tracing::error!(error = %failure, "Worker fleet health check failed");
        Err(BridgeError::Unavailable(failure))
    }
}

/// Decode a 2xx JSON body, or classify a non-2xx answer.
async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, FleetError> {
    let status = response.status();

    if !status.is_success() {
        let body = response.bytes().await.unwrap_or_default();
        return Err(classify_failure(status, &body));
    }

    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| FleetError::InvalidResponse(e.to_string()))
}

/// A `{code, message}` body makes the answer a rejection; anything else is
/// a bare transport failure carrying only the status.
fn classify_failure(status: reqwest::StatusCode, body: &[u8]) -> FleetError {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            code,
            message,
            error,
        }) if code.is_some() || message.is_some() || error.is_some() => FleetError::Rejected {
            status: status.as_u16(),
            code,
            message: message
                .or(error)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
        },
        _ => FleetError::HttpStatus {
            status: status.as_u16(),
        },
    }
}
