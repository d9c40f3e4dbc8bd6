use std::sync::Arc;

use aidi_fleet::FleetBridge;

use crate::config::ServerConfig;
use crate::status::EvaluationStatusSink;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Client for the worker fleet, built once at startup.
    pub bridge: Arc<dyn FleetBridge>,
    /// Receiver of evaluation status transitions.
    pub status_sink: Arc<dyn EvaluationStatusSink>,
}
