//! Stream playback: controllers, recovery and the shared element.
//!
//! The [`orchestrator::PlaybackOrchestrator`] is the sans-IO core; the
//! [`engine::PlaybackEngine`] runs it on its own thread with tokio timers.

pub mod adaptive;
pub mod controller;
pub mod direct;
pub mod engine;
pub mod format;
pub mod media;
pub mod orchestrator;
pub mod phase;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    adaptive::{
        AdaptiveClient, AdaptiveClientFactory, AdaptiveConfig, AdaptiveError, AdaptiveErrorType,
        AdaptiveEvent, AdaptiveStreamController, ManifestSummary,
    },
    controller::{ControllerOutput, RecoveryAction, StreamController, StreamKind},
    direct::DirectStreamController,
    engine::{EngineParts, PlaybackEngine},
    format::detect_stream_format,
    media::{CorsMode, ElementConfig, MediaBackend, MediaElement, MediaErrorKind, MediaEvent},
    orchestrator::PlaybackOrchestrator,
    phase::AttachPhase,
    registry::{GlobalPlaybackRegistry, OwnerId, RegistrySnapshot},
    retry::{RetryHandler, RetryState},
    scheduler::{CycleToken, ManualScheduler, Scheduler, TimerHandle, TokioScheduler},
    session::PlaybackSession,
};
