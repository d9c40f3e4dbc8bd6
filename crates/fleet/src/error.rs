//! Error types for calls to the worker fleet.
//!
//! [`FleetError`] describes one failed attempt and decides whether it is
//! worth retrying. [`BridgeError`] is what escapes the bridge once retries
//! are spent or a failure is permanent.

use crate::retry::{AttemptError, Retryable, RetryError};
use crate::token::TokenError;

// ---------------------------------------------------------------------------
// FleetError
// ---------------------------------------------------------------------------

/// Failure of a single request to the fleet.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// Network, DNS, TLS or connection failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx answer without a structured error body.
    #[error("Fleet returned HTTP {status}")]
    HttpStatus { status: u16 },

    /// Non-2xx answer carrying a `{code, message}` body.
    #[error("Fleet rejected the request (HTTP {status}{}): {message}", code_suffix(.code))]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// 2xx answer whose body does not match the contract.
    #[error("Fleet returned an unreadable response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Token(#[from] TokenError),
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref().map(|c| format!(", {c}")).unwrap_or_default()
}

/// Statuses that signal a temporary condition on the fleet side.
fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

impl Retryable for FleetError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::HttpStatus { .. } => true,
            // A structured 4xx means the fleet read the request and refused
            // it; sending the same request again gets the same answer.
            Self::Rejected { status, .. } => is_transient_status(*status),
            // The fleet may already have accepted the job.
            Self::InvalidResponse(_) => false,
            Self::Token(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// BridgeError
// ---------------------------------------------------------------------------

/// Terminal failure of a bridge operation.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Required configuration is missing or invalid. Never retried.
    #[error("Bridge configuration error: {0}")]
    Configuration(String),

    /// Token minting failed for a reason other than a missing secret.
    #[error(transparent)]
    Token(TokenError),

    /// The fleet explicitly refused the request with a permanent status.
    #[error("Fleet rejected the request (HTTP {status}{}): {message}", code_suffix(.code))]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Fleet returned an unreadable response: {0}")]
    InvalidResponse(String),

    /// All attempts failed; `last` is the final attempt's failure.
    #[error("Fleet call failed after {attempts} attempt(s): {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: AttemptError<FleetError>,
    },

    /// The single-shot health probe failed.
    #[error("Fleet unavailable: {0}")]
    Unavailable(#[source] AttemptError<FleetError>),
}

impl BridgeError {
    /// Whether the terminal failure was a missed deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ExhaustedRetries { last, .. } | Self::Unavailable(last) => last.is_timeout(),
            _ => false,
        }
    }

    /// Error code reported by the fleet, if its last answer carried one.
    pub fn fleet_code(&self) -> Option<&str> {
        match self {
            Self::Rejected { code, .. } => code.as_deref(),
            Self::ExhaustedRetries { last, .. } | Self::Unavailable(last) => match last.failure() {
                Some(FleetError::Rejected { code, .. }) => code.as_deref(),
                _ => None,
            },
            _ => None,
        }
    }

    /// HTTP status of the fleet's last answer, if it answered at all.
    pub fn fleet_status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::ExhaustedRetries { last, .. } | Self::Unavailable(last) => match last.failure() {
                Some(FleetError::Rejected { status, .. } | FleetError::HttpStatus { status }) => {
                    Some(*status)
                }
                _ => None,
            },
            _ => None,
        }
    }
}

impl From<TokenError> for BridgeError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::MissingSecret => Self::Configuration(err.to_string()),
            other => Self::Token(other),
        }
    }
}

impl From<RetryError<FleetError>> for BridgeError {
    fn from(err: RetryError<FleetError>) -> Self {
        match err {
            RetryError::Aborted { attempt, source } => match source {
                FleetError::Rejected {
                    status,
                    code,
                    message,
                } => Self::Rejected {
                    status,
                    code,
                    message,
                },
                FleetError::InvalidResponse(msg) => Self::InvalidResponse(msg),
                FleetError::Token(e) => e.into(),
                other => Self::ExhaustedRetries {
                    attempts: attempt,
                    last: AttemptError::Failed(other),
                },
            },
            RetryError::Exhausted { attempts, last } => Self::ExhaustedRetries { attempts, last },
        }
    }
}
