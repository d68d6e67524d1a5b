//! Stream controller contract.
//!
//! A controller owns the event handling of one attach cycle. It never touches
//! timers or observable state itself: every side effect beyond commanding the
//! element is returned as a list of [`ControllerOutput`]s, which the
//! orchestrator applies in order.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    playback::{
        adaptive::AdaptiveEvent,
        media::{MediaElement, MediaEvent},
        phase::AttachPhase,
        retry::RetryHandler,
    },
    state::PlaybackFailure,
};

/// Which controller a URL is played with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    /// The element plays the URL itself.
    Direct,
    /// An adaptive client fetches and stitches segments.
    Adaptive,
}

/// Deferred recovery primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Reload the source with the permissive CORS fallback.
    ReloadPermissive,
    /// Reload the same source with the current CORS mode.
    ReloadSameSource,
    /// Restart the adaptive client's loader.
    RestartAdaptiveLoad,
    /// Ask the adaptive client to recover its media pipeline.
    RecoverAdaptiveMedia,
}

/// Side effect requested by a controller.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerOutput {
    /// Set or clear the observable loading flag.
    SetLoading(bool),
    /// Cancel the load-timeout watchdog of this cycle.
    CancelLoadTimeout,
    /// Start the load-timeout watchdog for a new load attempt.
    ArmLoadTimeout,
    /// Run `action` after `delay`.
    ScheduleRecovery {
        delay: Duration,
        action: RecoveryAction,
    },
    /// Re-issue the play request if the user still wants audio.
    ResumePlayback,
    /// The stream recovered on its own: drop the pending recovery and the
    /// interruption it raised.
    RecoveryResolved,
    /// The cycle failed for good.
    Terminal(PlaybackFailure),
}

/// Event handling for one attach cycle.
pub trait StreamController: Send {
    /// Controller flavour.
    fn kind(&self) -> StreamKind;

    /// URL this controller plays.
    fn url(&self) -> &str;

    /// Current phase.
    fn phase(&self) -> AttachPhase;

    /// Points the element at the URL and starts loading.
    fn attach(&mut self, element: &mut dyn MediaElement) -> Vec<ControllerOutput>;

    /// Handles a native element event.
    fn handle_media_event(
        &mut self,
        event: &MediaEvent,
        load_retry: &mut RetryHandler,
    ) -> Vec<ControllerOutput>;

    /// Handles an adaptive client event. Direct controllers ignore these.
    fn handle_adaptive_event(
        &mut self,
        _event: &AdaptiveEvent,
        _load_retry: &mut RetryHandler,
    ) -> Vec<ControllerOutput> {
        Vec::new()
    }

    /// The readiness watchdog expired without a ready signal.
    fn handle_load_timeout(&mut self, load_retry: &mut RetryHandler) -> Vec<ControllerOutput>;

    /// Runs a previously scheduled recovery.
    fn run_recovery(
        &mut self,
        action: RecoveryAction,
        element: &mut dyn MediaElement,
    ) -> Vec<ControllerOutput>;

    /// Ends the cycle. The element is absent when ownership was lost.
    fn detach(&mut self, element: Option<&mut dyn MediaElement>);
}
