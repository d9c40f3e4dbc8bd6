//! Request handlers.
//!
//! Handlers validate input, delegate to the injected [`aidi_fleet::FleetBridge`]
//! and map failures via [`crate::error::AppError`].

pub mod bridge;
