use aidi_core::error::CoreError;
use aidi_fleet::retry::AttemptError;
use aidi_fleet::{BridgeError, FleetError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Application-level error type for HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Boundary validation or startup configuration failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Terminal failure of a bridge call.
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// Fleet status could not be read. Always 503, whatever the cause.
    #[error("Fleet status unavailable: {0}")]
    FleetUnavailable(#[source] BridgeError),

    #[error("Method {0} not allowed")]
    MethodNotAllowed(String),

    /// Dispatch is switched off by `BRIDGE_ENABLED`.
    #[error("Dispatch bridge is not enabled")]
    BridgeDisabled,

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, CorrelatedError>;

/// How an [`AppError`] is presented to the caller.
#[derive(Debug)]
pub struct ErrorParts {
    pub status: StatusCode,
    pub code: String,
    /// Message safe to show in any environment.
    pub message: String,
    /// Error code the fleet attached to its last answer, if any.
    pub fleet_code: Option<String>,
}

impl ErrorParts {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
            fleet_code: None,
        }
    }
}

impl AppError {
    /// Classify the error into status, code and public message.
    pub fn parts(&self) -> ErrorParts {
        match self {
            AppError::Core(CoreError::Validation(msg)) => {
                ErrorParts::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::Core(CoreError::Configuration(_)) => configuration_error(),
            AppError::Bridge(err) => classify_bridge_error(err),
            AppError::FleetUnavailable(err) => ErrorParts {
                fleet_code: err.fleet_code().map(str::to_string),
                ..ErrorParts::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "FLEET_UNAVAILABLE",
                    "Worker fleet status is unavailable",
                )
            },
            AppError::MethodNotAllowed(method) => ErrorParts::new(
                StatusCode::METHOD_NOT_ALLOWED,
                "METHOD_NOT_ALLOWED",
                format!("Method {method} not allowed"),
            ),
            AppError::BridgeDisabled => ErrorParts::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "BRIDGE_DISABLED",
                "Dispatch bridge is not enabled",
            ),
            AppError::RequestTimeout => ErrorParts::new(
                StatusCode::REQUEST_TIMEOUT,
                "REQUEST_TIMEOUT",
                "Request timed out",
            ),
            AppError::Internal(_) => ErrorParts::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error",
            ),
        }
    }

    /// Attach the request's correlation id, producing a response-ready error.
    pub fn correlate(self, request_id: impl Into<String>, expose_detail: bool) -> CorrelatedError {
        CorrelatedError {
            request_id: request_id.into(),
            error: self,
            expose_detail,
        }
    }
}

fn configuration_error() -> ErrorParts {
    ErrorParts::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "CONFIGURATION_ERROR",
        "Service is not configured to dispatch evaluations",
    )
}

/// Map a terminal bridge failure to the status the caller sees.
///
/// - Configuration and token failures are ours: 500.
/// - A fleet 4xx rejection passes through with the fleet's code.
/// - Exhausted retries: 503 when the fleet never answered (timeout or
///   network), 502 when it answered with an error.
fn classify_bridge_error(err: &BridgeError) -> ErrorParts {
    let fleet_code = err.fleet_code().map(str::to_string);

    let parts = match err {
        BridgeError::Configuration(_) | BridgeError::Token(_) => configuration_error(),
        BridgeError::Rejected {
            status,
            code,
            message,
        } => match StatusCode::from_u16(*status) {
            Ok(status) if status.is_client_error() => ErrorParts::new(
                status,
                code.as_deref().unwrap_or("FLEET_REJECTED"),
                message.clone(),
            ),
            _ => fleet_error(),
        },
        BridgeError::InvalidResponse(_) => fleet_error(),
        BridgeError::ExhaustedRetries { last, .. } => match last {
            AttemptError::TimedOut(_) => ErrorParts::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "FLEET_TIMEOUT",
                "Worker fleet did not respond in time",
            ),
            AttemptError::Failed(FleetError::Request(_)) => fleet_unreachable(),
            AttemptError::Failed(_) => fleet_error(),
        },
        BridgeError::Unavailable(_) => fleet_unreachable(),
    };

    ErrorParts { fleet_code, ..parts }
}

fn fleet_error() -> ErrorParts {
    ErrorParts::new(
        StatusCode::BAD_GATEWAY,
        "FLEET_ERROR",
        "Worker fleet returned an error",
    )
}

fn fleet_unreachable() -> ErrorParts {
    ErrorParts::new(
        StatusCode::SERVICE_UNAVAILABLE,
        "FLEET_UNAVAILABLE",
        "Worker fleet is unavailable",
    )
}

/// An [`AppError`] bound to the correlation id of the request that raised it.
///
/// Renders as `{ "error", "code", "requestId" }`, plus `fleetCode` when the
/// fleet supplied one and `message` with the internal error chain when
/// `expose_detail` is set.
#[derive(Debug)]
pub struct CorrelatedError {
    pub request_id: String,
    pub error: AppError,
    pub expose_detail: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    code: String,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fleet_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for CorrelatedError {
    fn into_response(self) -> Response {
        let parts = self.error.parts();

        if parts.status.is_server_error() {
            tracing::error!(
                request_id = %self.request_id,
                code = %parts.code,
                error = %self.error,
                "Request failed",
            );
        } else {
            tracing::warn!(
                request_id = %self.request_id,
                code = %parts.code,
                error = %self.error,
                "Request rejected",
            );
        }

        let body = ErrorBody {
            error: parts.message,
            code: parts.code,
            request_id: self.request_id,
            fleet_code: parts.fleet_code,
            message: self.expose_detail.then(|| self.error.to_string()),
        };

        (parts.status, axum::Json(body)).into_response()
    }
}
