//! Warden - supervise fleets of self-hosted game server instances
//!
//! The core manages each instance's on-disk layout, typed
//! configuration, process supervision, and archive snapshots; the
//! control plane owns the name registry and dispatches typed commands
//! against it.

pub mod control;
pub mod core;

/// Application name constant
pub const APP_NAME: &str = "warden";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
