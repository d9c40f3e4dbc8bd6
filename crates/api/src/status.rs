//! Evaluation status updates triggered by dispatch.
//!
//! The evaluation record lives elsewhere; the endpoint only reports the
//! transition through [`EvaluationStatusSink`]. A failed update is logged and
//! never changes the HTTP answer, since the fleet has already been told.

use aidi_core::dispatch::DispatchOutcome;
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
#[error("Status update failed: {0}")]
pub struct StatusSinkError(pub String);

#[async_trait]
pub trait EvaluationStatusSink: Send + Sync {
    /// The fleet accepted the evaluation.
    async fn mark_processing(
        &self,
        evaluation_id: &str,
        outcome: &DispatchOutcome,
    ) -> Result<(), StatusSinkError>;

    /// Dispatch failed for good.
    async fn mark_dispatch_failed(
        &self,
        evaluation_id: &str,
        reason: &str,
    ) -> Result<(), StatusSinkError>;
}

/// Sink that records transitions in the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

#[async_trait]
impl EvaluationStatusSink for TracingStatusSink {
    async fn mark_processing(
        &self,
        evaluation_id: &str,
        outcome: &DispatchOutcome,
    ) -> Result<(), StatusSinkError> {
        tracing::info!(
            evaluation_id,
            job_id = %outcome.job_id,
            queue_position = outcome.queue_position,
            status = "processing",
            "Evaluation status updated",
        );
        Ok(())
    }

    async fn mark_dispatch_failed(
        &self,
        evaluation_id: &str,
        reason: &str,
    ) -> Result<(), StatusSinkError> {
        tracing::warn!(
            evaluation_id,
            reason,
            status = "dispatch_failed",
            "Evaluation status updated",
        );
        Ok(())
    }
}
