//! Controller for plain media URLs.
//!
//! The element fetches the URL itself. Load errors and watchdog expiries
//! reload with the permissive CORS fallback; stalls reload the same source.
//! Both paths share the session's load [`RetryHandler`].

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    playback::{
        controller::{ControllerOutput, RecoveryAction, StreamController, StreamKind},
        media::{CorsMode, MediaElement, MediaEvent},
        phase::{AttachPhase, PhaseTrigger},
        retry::RetryHandler,
    },
    state::{FailureKind, PlaybackFailure},
};

/// Plays a URL directly on the element.
#[derive(Debug)]
pub struct DirectStreamController {
    /// Stream URL.
    url: String,
    /// Attach-cycle phase.
    phase: AttachPhase,
    /// CORS mode of the current source.
    cors: CorsMode,
    /// Whether the element is ours to listen to.
    attached: bool,
    /// One-shot `loadstart`/`canplay`/`error` handlers are live.
    armed: bool,
}

impl DirectStreamController {
    /// Creates an idle controller for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            phase: AttachPhase::Idle,
            cors: CorsMode::Anonymous,
            attached: false,
            armed: false,
        }
    }

    /// CORS mode the source is currently fetched with.
    #[must_use]
    pub fn cors_mode(&self) -> CorsMode {
        self.cors
    }

    /// Load error or watchdog expiry.
    fn load_failed(&mut self, load_retry: &mut RetryHandler, cause: &str) -> Vec<ControllerOutput> {
        self.armed = false;
        let retry_allowed = load_retry.should_retry();
        self.phase = self.phase.next(PhaseTrigger::Fault { retry_allowed });

        if retry_allowed {
            let delay = load_retry.get_delay();
            load_retry.increment_retry();
            info!(
                url = %self.url,
                attempt = load_retry.get_retry_count(),
                delay_ms = delay.as_millis() as u64,
                "{cause}, reloading with permissive CORS"
            );
            vec![
                ControllerOutput::CancelLoadTimeout,
                ControllerOutput::ScheduleRecovery {
                    delay,
                    action: RecoveryAction::ReloadPermissive,
                },
            ]
        } else {
            warn!(url = %self.url, "{cause}, load retries exhausted");
            vec![
                ControllerOutput::CancelLoadTimeout,
                ControllerOutput::Terminal(PlaybackFailure::new(
                    self.url.clone(),
                    FailureKind::LoadRetriesExhausted {
                        attempts: load_retry.get_retry_count(),
                    },
                )),
            ]
        }
    }

    fn stalled(&mut self, load_retry: &mut RetryHandler) -> Vec<ControllerOutput> {
        if !matches!(self.phase, AttachPhase::Loading | AttachPhase::Playing) {
            debug!(url = %self.url, phase = ?self.phase, "Stall ignored");
            return Vec::new();
        }
        if !load_retry.should_retry() {
            debug!(url = %self.url, "Stall ignored, load retries exhausted");
            return Vec::new();
        }

        let delay: Duration = load_retry.get_delay();
        load_retry.increment_retry();
        self.armed = false;
        self.phase = self.phase.next(PhaseTrigger::Fault {
            retry_allowed: true,
        });
        info!(
            url = %self.url,
            attempt = load_retry.get_retry_count(),
            delay_ms = delay.as_millis() as u64,
            "Stream stalled, reloading"
        );
        vec![
            ControllerOutput::CancelLoadTimeout,
            ControllerOutput::ScheduleRecovery {
                delay,
                action: RecoveryAction::ReloadSameSource,
            },
        ]
    }
}

impl StreamController for DirectStreamController {
    fn kind(&self) -> StreamKind {
        StreamKind::Direct
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn phase(&self) -> AttachPhase {
        self.phase
    }

    fn attach(&mut self, element: &mut dyn MediaElement) -> Vec<ControllerOutput> {
        self.cors = CorsMode::Anonymous;
        element.set_source(&self.url, self.cors);
        element.load();

        self.attached = true;
        self.armed = true;
        self.phase = self.phase.next(PhaseTrigger::Attach);
        debug!(url = %self.url, "Direct stream attached");

        vec![
            ControllerOutput::SetLoading(true),
            ControllerOutput::ArmLoadTimeout,
        ]
    }

    fn handle_media_event(
        &mut self,
        event: &MediaEvent,
        load_retry: &mut RetryHandler,
    ) -> Vec<ControllerOutput> {
        if !self.attached || self.phase.is_terminal() {
            return Vec::new();
        }

        match event {
            MediaEvent::LoadStart if self.armed => vec![ControllerOutput::SetLoading(true)],
            MediaEvent::CanPlay if self.armed => {
                self.armed = false;
                load_retry.reset();
                self.phase = self.phase.next(PhaseTrigger::Ready);
                debug!(url = %self.url, "Stream ready");
                vec![
                    ControllerOutput::SetLoading(false),
                    ControllerOutput::CancelLoadTimeout,
                ]
            }
            MediaEvent::Error(kind) if self.armed => {
                self.load_failed(load_retry, &format!("Media error {kind:?}"))
            }
            MediaEvent::Error(kind) => {
                debug!(url = %self.url, ?kind, "Media error outside a load attempt");
                Vec::new()
            }
            MediaEvent::Stalled => self.stalled(load_retry),
            MediaEvent::Progress { buffered_ranges } if *buffered_ranges > 0 => {
                vec![ControllerOutput::SetLoading(false)]
            }
            _ => Vec::new(),
        }
    }

    fn handle_load_timeout(&mut self, load_retry: &mut RetryHandler) -> Vec<ControllerOutput> {
        if !self.attached || self.phase != AttachPhase::Loading {
            return Vec::new();
        }
        self.load_failed(load_retry, "Load timed out")
    }

    fn run_recovery(
        &mut self,
        action: RecoveryAction,
        element: &mut dyn MediaElement,
    ) -> Vec<ControllerOutput> {
        if !self.attached || self.phase != AttachPhase::Recovering {
            debug!(url = %self.url, phase = ?self.phase, "Recovery no longer needed");
            return Vec::new();
        }

        match action {
            RecoveryAction::ReloadPermissive => self.cors = CorsMode::Permissive,
            RecoveryAction::ReloadSameSource => {}
            RecoveryAction::RestartAdaptiveLoad | RecoveryAction::RecoverAdaptiveMedia => {
                warn!(url = %self.url, ?action, "Adaptive recovery on a direct stream");
                return Vec::new();
            }
        }

        element.set_source(&self.url, self.cors);
        element.load();
        self.armed = true;
        self.phase = self.phase.next(PhaseTrigger::RetryFired);

        vec![
            ControllerOutput::SetLoading(true),
            ControllerOutput::ArmLoadTimeout,
            ControllerOutput::ResumePlayback,
        ]
    }

    fn detach(&mut self, _element: Option<&mut dyn MediaElement>) {
        self.attached = false;
        self.armed = false;
        self.phase = self.phase.next(PhaseTrigger::Detach);
        debug!(url = %self.url, "Direct stream detached");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        playback::{
            controller::{ControllerOutput, RecoveryAction, StreamController},
            direct::DirectStreamController,
            media::{CorsMode, MediaErrorKind, MediaEvent},
            phase::AttachPhase,
            retry::RetryHandler,
            testing::{ElementCommand, FakeMediaElement},
        },
        state::FailureKind,
    };

    fn attached() -> (DirectStreamController, FakeMediaElement, RetryHandler) {
        let mut element = FakeMediaElement::new();
        let mut controller = DirectStreamController::new("https://radio.example/live.mp3");
        let outputs = controller.attach(&mut element);
        assert_eq!(
            outputs,
            vec![
                ControllerOutput::SetLoading(true),
                ControllerOutput::ArmLoadTimeout
            ]
        );
        (
            controller,
            element,
            RetryHandler::new(3, Duration::from_millis(1000)),
        )
    }

    #[test]
    fn test_attach_loads_with_anonymous_cors() {
        let (controller, element, _) = attached();
        assert_eq!(controller.phase(), AttachPhase::Loading);
        assert_eq!(
            element.commands(),
            vec![
                ElementCommand::SetSource {
                    url: "https://radio.example/live.mp3".to_string(),
                    cors: CorsMode::Anonymous,
                },
                ElementCommand::Load,
            ]
        );
    }

    #[test]
    fn test_canplay_resets_retry_and_disarms() {
        let (mut controller, _, mut retry) = attached();
        retry.increment_retry();

        let outputs = controller.handle_media_event(&MediaEvent::CanPlay, &mut retry);
        assert_eq!(
            outputs,
            vec![
                ControllerOutput::SetLoading(false),
                ControllerOutput::CancelLoadTimeout
            ]
        );
        assert_eq!(retry.get_retry_count(), 0);
        assert_eq!(controller.phase(), AttachPhase::Playing);

        // One-shot handlers do not re-fire within the cycle.
        let outputs = controller.handle_media_event(&MediaEvent::CanPlay, &mut retry);
        assert!(outputs.is_empty());
        let error = MediaEvent::Error(MediaErrorKind::Network);
        let outputs = controller.handle_media_event(&error, &mut retry);
        assert!(outputs.is_empty());
    }

    #[test]
    fn test_error_schedules_permissive_reload() {
        let (mut controller, mut element, mut retry) = attached();

        let outputs =
            controller.handle_media_event(&MediaEvent::Error(MediaErrorKind::Network), &mut retry);
        assert_eq!(
            outputs,
            vec![
                ControllerOutput::CancelLoadTimeout,
                ControllerOutput::ScheduleRecovery {
                    delay: Duration::from_millis(1000),
                    action: RecoveryAction::ReloadPermissive,
                },
            ]
        );
        assert_eq!(retry.get_retry_count(), 1);
        assert_eq!(controller.phase(), AttachPhase::Recovering);

        element.clear();
        let outputs = controller.run_recovery(RecoveryAction::ReloadPermissive, &mut element);
        assert_eq!(
            outputs,
            vec![
                ControllerOutput::SetLoading(true),
                ControllerOutput::ArmLoadTimeout,
                ControllerOutput::ResumePlayback,
            ]
        );
        assert_eq!(controller.cors_mode(), CorsMode::Permissive);
        assert_eq!(controller.phase(), AttachPhase::Loading);
        assert_eq!(element.commands().len(), 2);
    }

    #[test]
    fn test_error_after_budget_is_terminal_once() {
        let (mut controller, mut element, mut retry) = attached();
        let error = MediaEvent::Error(MediaErrorKind::SourceNotSupported);

        for _ in 0..3 {
            controller.handle_media_event(&error, &mut retry);
            controller.run_recovery(RecoveryAction::ReloadPermissive, &mut element);
        }

        let outputs = controller.handle_media_event(&error, &mut retry);
        assert!(matches!(
            outputs.as_slice(),
            [
                ControllerOutput::CancelLoadTimeout,
                ControllerOutput::Terminal(failure)
            ] if failure.kind == FailureKind::LoadRetriesExhausted { attempts: 3 }
        ));
        assert_eq!(controller.phase(), AttachPhase::Failed);

        assert!(controller.handle_media_event(&error, &mut retry).is_empty());
        assert!(controller.handle_load_timeout(&mut retry).is_empty());
    }

    #[test]
    fn test_stall_reloads_same_source_within_budget() {
        let (mut controller, mut element, mut retry) = attached();
        controller.handle_media_event(&MediaEvent::CanPlay, &mut retry);

        let outputs = controller.handle_media_event(&MediaEvent::Stalled, &mut retry);
        assert!(matches!(
            outputs.as_slice(),
            [
                ControllerOutput::CancelLoadTimeout,
                ControllerOutput::ScheduleRecovery {
                    action: RecoveryAction::ReloadSameSource,
                    ..
                }
            ]
        ));

        // A second stall while recovering does not stack another reload.
        let outputs = controller.handle_media_event(&MediaEvent::Stalled, &mut retry);
        assert!(outputs.is_empty());

        controller.run_recovery(RecoveryAction::ReloadSameSource, &mut element);
        assert_eq!(controller.cors_mode(), CorsMode::Anonymous);
    }

    #[test]
    fn test_stall_without_budget_is_ignored() {
        let (mut controller, _, _) = attached();
        let mut retry = RetryHandler::new(0, Duration::from_millis(1000));

        let outputs = controller.handle_media_event(&MediaEvent::Stalled, &mut retry);
        assert!(outputs.is_empty());
        assert_eq!(controller.phase(), AttachPhase::Loading);
    }

    #[test]
    fn test_progress_clears_loading_early() {
        let (mut controller, _, mut retry) = attached();

        let empty = MediaEvent::Progress { buffered_ranges: 0 };
        let outputs = controller.handle_media_event(&empty, &mut retry);
        assert!(outputs.is_empty());
        assert_eq!(
            controller.handle_media_event(&MediaEvent::Progress { buffered_ranges: 1 }, &mut retry),
            vec![ControllerOutput::SetLoading(false)]
        );
    }

    #[test]
    fn test_detached_controller_ignores_events() {
        let (mut controller, mut element, mut retry) = attached();
        controller.handle_media_event(&MediaEvent::Error(MediaErrorKind::Network), &mut retry);
        controller.detach(None);

        assert_eq!(controller.phase(), AttachPhase::Idle);
        let outputs = controller.handle_media_event(&MediaEvent::CanPlay, &mut retry);
        assert!(outputs.is_empty());
        let outputs = controller.run_recovery(RecoveryAction::ReloadPermissive, &mut element);
        assert!(outputs.is_empty());
    }
}
