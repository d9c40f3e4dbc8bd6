//! Domain types shared by the evaluation dispatch bridge and the web tier.
//!
//! - [`dispatch`] -- dispatch requests, their boundary validation, and the
//!   placement data the worker fleet answers with.
//! - [`queue`] -- queue metric snapshots and fleet health.

pub mod dispatch;
pub mod error;
pub mod queue;
pub mod types;
