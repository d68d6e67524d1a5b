//! Error handling built on `thiserror` and `anyhow`.
//!
//! Domain enums describe API misuse and configuration failures precisely;
//! the operational helpers attach context and report through `tracing`.
//! Recoverable stream failures are never errors here: they surface as
//! `PlaybackFailure` state on the player snapshot.

pub mod domain;
pub mod operational;

pub use {
    domain::{EngineError, PlaybackError, RegistryError, Result},
    operational::{ErrorReporter, ResultExt},
};
