//! Authenticated bridge between the web tier and the evaluation worker fleet.
//!
//! - [`config`] -- fleet address, signing secret, retry policy.
//! - [`token`] -- capability tokens scoped to a single evaluation.
//! - [`retry`] -- bounded retry with fixed backoff and per-attempt deadlines.
//! - [`client`] -- [`client::BridgeClient`] and the injectable
//!   [`client::FleetBridge`] trait.
//! - [`error`] -- per-attempt and terminal error types.

pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod token;

pub use client::{BridgeClient, FleetBridge};
pub use config::{BridgeConfig, RetryPolicy};
pub use error::{BridgeError, FleetError};
