//! Queue metric snapshots and fleet health as reported by the worker fleet.
//!
//! The bridge never transitions job states; it only reads counts. Jobs move
//! `waiting -> active -> completed | failed` inside the fleet, and a job may
//! sit in `delayed` before it becomes `waiting` again.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Timestamp;

/// Lifecycle state of a job inside the worker fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

/// Point-in-time queue counts, produced on demand and never cached.
///
/// Fields the fleet adds beyond the known ones are kept in `extra` and
/// serialized back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetrics {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    /// Jobs finished per minute.
    pub processing_rate: f64,
    /// Mean job duration in milliseconds.
    pub average_processing_time: f64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QueueMetrics {
    pub fn count(&self, state: JobState) -> u64 {
        match state {
            JobState::Waiting => self.waiting,
            JobState::Active => self.active,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Delayed => self.delayed,
        }
    }

    /// Jobs not yet finished (waiting, active or delayed).
    pub fn pending(&self) -> u64 {
        self.waiting + self.active + self.delayed
    }
}

/// Liveness answer from the fleet's public health probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetHealth {
    pub status: String,
    pub timestamp: Timestamp,
}
