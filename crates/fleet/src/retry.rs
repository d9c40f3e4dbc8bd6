//! Bounded retry with fixed backoff and a per-attempt deadline.
//!
//! [`RetryExecutor::run`] knows nothing about what the operation does. It
//! awaits each attempt under [`RetryPolicy::attempt_timeout`], sleeps
//! [`RetryPolicy::delay_for`] between attempts (never after the last one),
//! and stops early when the operation reports a non-retryable error.
//! Attempts are strictly sequential.
//!
//! An attempt that misses its deadline is dropped, which cancels whatever it
//! was awaiting (for an HTTP call, the connection is closed).

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryPolicy;

/// Errors that know whether repeating the same call could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Why a single attempt did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError<E> {
    #[error(transparent)]
    Failed(E),

    #[error("attempt timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

impl<E> AttemptError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    /// The operation's own error, if the attempt did not time out.
    pub fn failure(&self) -> Option<&E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::TimedOut(_) => None,
        }
    }
}

/// Terminal outcome of a retried operation that never succeeded.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The operation returned an error that retrying cannot fix.
    #[error("attempt {attempt} failed permanently: {source}")]
    Aborted {
        attempt: u32,
        #[source]
        source: E,
    },

    /// Every attempt failed; `last` is the final attempt's failure.
    #[error("all {attempts} attempts failed, last error: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: AttemptError<E>,
    },
}

/// Stateless executor; share freely across tasks.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails permanently, or runs out of
    /// attempts. The operation receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let timeout = self.policy.attempt_timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let failure = match tokio::time::timeout(timeout, operation(attempt)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if !e.is_retryable() => {
                    tracing::warn!(attempt, error = %e, "Operation failed with a non-retryable error");
                    return Err(RetryError::Aborted { attempt, source: e });
                }
                Ok(Err(e)) => AttemptError::Failed(e),
                Err(_elapsed) => AttemptError::TimedOut(timeout),
            };

            if attempt >= max_attempts {
                tracing::error!(
                    attempts = attempt,
                    timed_out = failure.is_timeout(),
                    error = %failure,
                    "Operation failed after all retry attempts",
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: failure,
                });
            }

            let delay = self.policy.delay_for((attempt - 1) as usize);
            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                timed_out = failure.is_timeout(),
                error = %failure,
                "Operation failed, retrying",
            );
            tokio::time::sleep(delay).await;
        }
    }
}
