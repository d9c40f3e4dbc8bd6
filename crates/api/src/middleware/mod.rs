//! Request extractors shared by handlers.
//!
//! - [`correlation::CorrelationId`] -- the per-request correlation id.

pub mod correlation;
