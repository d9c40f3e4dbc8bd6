//! Handlers for the dispatch endpoint (`/api/v1/bridge/enqueue`).
//!
//! `POST` validates and dispatches one evaluation, `GET` reports combined
//! fleet status. Every answer carries the request's correlation id.

use aidi_core::dispatch::{
    DispatchOutcome, DispatchPayload, DispatchRequest, Priority, ServiceTier,
};
use aidi_core::error::CoreError;
use aidi_core::queue::{FleetHealth, QueueMetrics};
use aidi_core::types::Timestamp;
use aidi_fleet::BridgeError;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::Method;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AppError, AppResult, CorrelatedError};
use crate::middleware::correlation::CorrelationId;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Response data for POST /api/v1/bridge/enqueue.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchAccepted {
    pub evaluation_id: String,
    pub job_id: String,
    pub queue_position: u64,
    pub estimated_start_time: Option<Timestamp>,
    pub agents: Vec<String>,
    pub priority: Priority,
}

/// Response data for GET /api/v1/bridge/enqueue.
#[derive(Debug, Serialize)]
pub struct FleetStatus {
    /// Whether POST dispatches at all.
    pub enabled: bool,
    pub tiers: Vec<&'static str>,
    pub queue: QueueMetrics,
    pub health: FleetHealth,
    pub timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// POST /api/v1/bridge/enqueue
///
/// Validates the body, enriches its metadata with the correlation id and
/// enqueue time, and dispatches it through the bridge. Validation failures
/// never reach the fleet, and nothing is dispatched while the bridge is
/// disabled.
///
/// The dispatch and its status update run on a spawned task, so a request
/// timeout or a dropped connection cannot cut a retry sequence short or skip
/// the status update.
pub async fn dispatch(
    State(state): State<AppState>,
    CorrelationId(request_id): CorrelationId,
    body: Bytes,
) -> AppResult<Json<DataResponse<DispatchAccepted>>> {
    let expose = state.config.development_mode;
    let fail = |error: AppError| error.correlate(request_id.as_str(), expose);

    if !state.config.bridge_enabled {
        return Err(fail(AppError::BridgeDisabled));
    }

    let mut request = parse_dispatch_body(&body).map_err(|e| fail(e.into()))?;

    request.insert_metadata("dispatchRequestId", Value::String(request_id.clone()));
    request.insert_metadata("enqueuedAt", Value::String(Utc::now().to_rfc3339()));

    tracing::info!(
        request_id = %request_id,
        evaluation_id = request.evaluation_id(),
        tier = %request.service_tier(),
        agent_count = request.agents().len(),
        "Dispatching evaluation",
    );

    let task = tokio::spawn(dispatch_and_record(
        state.clone(),
        request,
        request_id.clone(),
    ));
    let (request, result) = task
        .await
        .map_err(|e| fail(AppError::Internal(e.to_string())))?;

    match result {
        Ok(outcome) => Ok(Json(DataResponse::new(
            accepted(&request, outcome),
            request_id.as_str(),
        ))),
        Err(err) => Err(fail(err.into())),
    }
}

/// Dispatch through the bridge and record the result on the status sink.
///
/// Sink failures are logged and never change the dispatch result.
async fn dispatch_and_record(
    state: AppState,
    request: DispatchRequest,
    request_id: String,
) -> (DispatchRequest, Result<DispatchOutcome, BridgeError>) {
    let result = state.bridge.dispatch(&request).await;

    let recorded = match &result {
        Ok(outcome) => {
            state
                .status_sink
                .mark_processing(request.evaluation_id(), outcome)
                .await
        }
        Err(err) => {
            state
                .status_sink
                .mark_dispatch_failed(request.evaluation_id(), &err.to_string())
                .await
        }
    };

    if let Err(e) = recorded {
        tracing::warn!(
            request_id = %request_id,
            evaluation_id = request.evaluation_id(),
            dispatched = result.is_ok(),
            error = %e,
            "Failed to record dispatch status",
        );
    }

    (request, result)
}

/// Turn a raw request body into a validated [`DispatchRequest`].
fn parse_dispatch_body(body: &[u8]) -> Result<DispatchRequest, CoreError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(CoreError::Validation("Request body required".into()));
    }

    let payload: DispatchPayload = serde_json::from_slice(body)
        .map_err(|e| CoreError::Validation(format!("Invalid JSON body: {e}")))?;

    DispatchRequest::try_from(payload)
}

fn accepted(request: &DispatchRequest, outcome: DispatchOutcome) -> DispatchAccepted {
    DispatchAccepted {
        evaluation_id: request.evaluation_id().to_string(),
        job_id: outcome.job_id,
        queue_position: outcome.queue_position,
        estimated_start_time: outcome.estimated_start_time,
        agents: request.agents().to_vec(),
        priority: request.priority(),
    }
}

// ---------------------------------------------------------------------------
// Fleet status
// ---------------------------------------------------------------------------

/// GET /api/v1/bridge/enqueue
///
/// Whether dispatch is enabled, the accepted tiers, and queue metrics plus
/// fleet health fetched concurrently. Any fleet failure answers 503.
pub async fn fleet_status(
    State(state): State<AppState>,
    CorrelationId(request_id): CorrelationId,
) -> AppResult<Json<DataResponse<FleetStatus>>> {
    let (queue, health) = tokio::join!(state.bridge.queue_metrics(), state.bridge.health_check());

    let status = queue.and_then(|queue| health.map(|health| (queue, health)));
    let (queue, health) = status.map_err(|e| {
        AppError::FleetUnavailable(e).correlate(request_id.as_str(), state.config.development_mode)
    })?;

    Ok(Json(DataResponse::new(
        FleetStatus {
            enabled: state.config.bridge_enabled,
            tiers: ServiceTier::ALL.map(|t| t.as_str()).to_vec(),
            queue,
            health,
            timestamp: Utc::now(),
        },
        request_id,
    )))
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Any other method on the dispatch endpoint.
pub async fn method_not_allowed(
    State(state): State<AppState>,
    CorrelationId(request_id): CorrelationId,
    method: Method,
) -> CorrelatedError {
    AppError::MethodNotAllowed(method.to_string())
        .correlate(request_id, state.config.development_mode)
}
