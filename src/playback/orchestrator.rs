//! Playback orchestrator.
//!
//! The single entry point the host calls. It owns the user's play/pause
//! intent and the playlist position, picks a controller per URL, and applies
//! controller outputs: timers through the injected [`Scheduler`], observable
//! changes through [`PlayerState`]. Every method runs on the host's event
//! thread; nothing here blocks or spawns.

use std::sync::Arc;

use {
    fastrand::Rng,
    tracing::{debug, info, warn},
};

use crate::{
    catalog::{PlaylistAccessor, StreamTarget},
    config::{PreferenceStore, RecoveryPolicy},
    error::{ErrorReporter, PlaybackError, ResultExt},
    playback::{
        adaptive::{AdaptiveClientFactory, AdaptiveEvent, AdaptiveStreamController},
        controller::{ControllerOutput, StreamController, StreamKind},
        direct::DirectStreamController,
        format::detect_stream_format,
        media::MediaEvent,
        phase::AttachPhase,
        registry::{GlobalPlaybackRegistry, OwnerId, clamp_volume},
        retry::RetryState,
        scheduler::{CycleToken, Scheduler, TimerHandle},
        session::{ParkedPlayback, PlaybackSession, TimerPurpose},
    },
    state::{FailureKind, PlaybackFailure, PlayerSnapshot, PlayerState},
};

/// Coordinates controllers, timers and the shared element.
pub struct PlaybackOrchestrator {
    /// This instance's ownership identity.
    owner: OwnerId,
    /// Shared element and flags.
    registry: GlobalPlaybackRegistry,
    /// Ordered targets.
    playlist: Box<dyn PlaylistAccessor>,
    /// Deferred callbacks.
    scheduler: Box<dyn Scheduler>,
    /// Adaptive client factory; without one every URL plays directly.
    adaptive_factory: Option<Arc<dyn AdaptiveClientFactory>>,
    /// Volume and random-mode persistence.
    preferences: Box<dyn PreferenceStore>,
    /// Retry budgets and windows.
    policy: RecoveryPolicy,
    /// Observable state.
    state: PlayerState,
    /// The user wants audio.
    intent: bool,
    /// Playlist position.
    current_index: usize,
    /// Current attach cycle.
    session: Option<PlaybackSession>,
    /// Pending end of the navigation grace window.
    grace_timer: Option<TimerHandle>,
    /// Volume applied on mount and on request.
    volume: f32,
    /// `next` picks a random target.
    random_mode: bool,
    /// Random source for random mode.
    rng: Rng,
    /// Between `mount` and `unmount`.
    mounted: bool,
}

impl PlaybackOrchestrator {
    /// Creates an unmounted orchestrator.
    ///
    /// Saved volume and random mode are read from `preferences`; absent
    /// values fall back to full volume and sequential order.
    ///
    /// # Arguments
    ///
    /// * `registry` - Shared element owner.
    /// * `playlist` - Read-only target list.
    /// * `scheduler` - Timer source; expiries must be fed to [`Self::handle_timer`].
    /// * `preferences` - Preference persistence.
    /// * `policy` - Retry and watchdog tuning.
    #[must_use]
    pub fn new(
        registry: GlobalPlaybackRegistry,
        playlist: Box<dyn PlaylistAccessor>,
        scheduler: Box<dyn Scheduler>,
        preferences: Box<dyn PreferenceStore>,
        policy: RecoveryPolicy,
    ) -> Self {
        let volume = clamp_volume(preferences.volume().unwrap_or(1.0));
        let random_mode = preferences.random_mode().unwrap_or(false);
        let state = PlayerState::new();
        state.update(|snapshot| snapshot.volume = volume);

        Self {
            owner: OwnerId::next(),
            registry,
            playlist,
            scheduler,
            adaptive_factory: None,
            preferences,
            policy,
            state,
            intent: false,
            current_index: 0,
            session: None,
            grace_timer: None,
            volume,
            random_mode,
            rng: Rng::new(),
            mounted: false,
        }
    }

    /// Enables the adaptive controller for manifest URLs.
    #[must_use]
    pub fn with_adaptive_factory(mut self, factory: Arc<dyn AdaptiveClientFactory>) -> Self {
        self.adaptive_factory = Some(factory);
        self
    }

    /// Publishes into an existing state container.
    #[must_use]
    pub fn with_player_state(mut self, state: PlayerState) -> Self {
        let volume = self.volume;
        state.update(|snapshot| snapshot.volume = volume);
        self.state = state;
        self
    }

    /// Seeds random mode, for reproducible order.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = Rng::with_seed(seed);
        self
    }

    #[must_use]
    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    /// Claims the element and adopts playback parked by a previous owner.
    ///
    /// A parked session is adopted as is: no reload, its suspended timers are
    /// rescheduled here. If teardown paused the element without user intent,
    /// playback resumes. When a navigation grace window is open, it closes
    /// after `navigation_grace_ms`.
    pub fn mount(&mut self) {
        self.registry.ensure_initialized();
        self.registry.claim_ownership(self.owner);
        self.mounted = true;
        if let Err(e) = self
            .registry
            .set_volume(self.owner, self.volume)
            .add_context("Failed to apply saved volume")
        {
            ErrorReporter::debug(&e, "orchestrator");
        }

        if let Some(parked) = self.registry.take_parked() {
            self.adopt(parked);
        }

        if self.registry.snapshot().navigation_in_progress {
            let handle = self
                .scheduler
                .schedule_after(self.policy.navigation_grace(), CycleToken::next());
            self.grace_timer = Some(handle);
        }
    }

    fn adopt(&mut self, parked: ParkedPlayback) {
        self.intent = parked.intent;
        self.current_index = parked.current_index;

        if let Some(mut session) = parked.session {
            session.resume_timers(self.scheduler.as_mut());
            info!(
                owner = self.owner.value(),
                url = session.url(),
                cycle = session.cycle().value(),
                "Adopted parked session"
            );
            self.session = Some(session);
        }

        let track = self.session.as_ref().map(|session| session.target().clone());
        let (intent, index) = (self.intent, self.current_index);
        self.state.update(|snapshot| {
            snapshot.is_playing = intent;
            snapshot.current_index = index;
            snapshot.current_track = track;
        });

        self.resume_after_navigation();
    }

    /// Opens the navigation grace window and parks the live session.
    pub fn unmount(&mut self) {
        if !self.mounted {
            return;
        }
        self.mounted = false;

        self.registry.set_navigation_state(true);
        if let Some(handle) = self.grace_timer.take() {
            self.scheduler.cancel(handle);
        }

        let mut session = self.session.take();
        if let Some(session) = session.as_mut() {
            session.suspend_timers(self.scheduler.as_mut());
        }
        self.registry.park(ParkedPlayback {
            session,
            intent: self.intent,
            current_index: self.current_index,
        });
        debug!(owner = self.owner.value(), "Orchestrator unmounted");
    }

    /// Resumes if a navigation artifact paused the element under a playing intent.
    fn resume_after_navigation(&mut self) {
        let paused = self.registry.take_paused_during_navigation();
        if paused && self.intent && !self.registry.snapshot().explicitly_paused {
            info!("Resuming playback paused by navigation");
            self.attempt_play();
        }
    }

    /// Commands are accepted only while mounted and owning the element.
    fn ensure_active(&self) -> Result<(), PlaybackError> {
        if !self.mounted {
            return Err(PlaybackError::InvalidOperation {
                reason: "orchestrator is not mounted".to_string(),
            });
        }
        self.registry.check_owner(self.owner)?;
        Ok(())
    }

    fn target_at(&self, index: usize) -> Result<StreamTarget, PlaybackError> {
        let len = self.playlist.len();
        if len == 0 {
            return Err(PlaybackError::EmptyPlaylist);
        }
        self.playlist
            .get(index)
            .ok_or(PlaybackError::IndexOutOfRange { index, len })
    }

    /// Starts or resumes playback of the current target.
    ///
    /// A fresh load is made when nothing is attached, the target changed, or
    /// the current cycle failed, is recovering, or was interrupted by a
    /// pause. Otherwise the existing source is resumed.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError` if the playlist is empty, the orchestrator is
    /// not mounted, or it lost ownership of the element.
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        self.ensure_active()?;
        let len = self.playlist.len();
        if len == 0 {
            return Err(PlaybackError::EmptyPlaylist);
        }
        let target = self.target_at(self.current_index % len)?;

        self.registry.clear_interruption();
        self.registry.clear_explicit_pause();
        self.intent = true;
        self.state.update(|snapshot| {
            snapshot.is_playing = true;
            snapshot.failure = None;
        });

        let reload = match self.session.as_ref() {
            None => true,
            Some(session) => {
                !session.target().matches_url(&target.url)
                    || session.needs_reload()
                    || matches!(
                        session.phase(),
                        AttachPhase::Idle | AttachPhase::Failed | AttachPhase::Recovering
                    )
            }
        };

        if reload {
            self.current_index %= len;
            self.load_target(target)?;
        } else if let Some(session) = self.session.as_mut() {
            session.play_retry_mut().reset();
        }

        self.attempt_play();
        Ok(())
    }

    /// Pauses on behalf of the user.
    ///
    /// Pending retries of the current cycle are cancelled, so no stale
    /// recovery can restart playback. The pause is recorded as explicit.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError` if the orchestrator is not mounted or lost
    /// ownership of the element.
    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        self.ensure_active()?;
        self.intent = false;
        self.registry.update_playback_state(false, true, true);
        self.halt();
        self.registry
            .with_element(self.owner, |element| element.pause())?;
        Ok(())
    }

    /// Drops intent and pending work after a user pause.
    fn halt(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.cancel_all(self.scheduler.as_mut());
            if session.phase() != AttachPhase::Playing {
                session.mark_needs_reload();
            }
        }
        self.state.update(|snapshot| {
            snapshot.is_playing = false;
            snapshot.loading = false;
        });
    }

    /// Moves to the next target, wrapping. In random mode, a random other target.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError` if the playlist is empty or the element is
    /// not ours.
    pub fn next(&mut self) -> Result<(), PlaybackError> {
        self.ensure_active()?;
        let len = self.playlist.len();
        if len == 0 {
            return Err(PlaybackError::EmptyPlaylist);
        }

        let current = self.current_index % len;
        let index = if self.random_mode && len > 1 {
            let pick = self.rng.usize(..len - 1);
            if pick >= current { pick + 1 } else { pick }
        } else {
            (current + 1) % len
        };
        self.navigate_to(index)
    }

    /// Moves to the previous target, wrapping.
    ///
    /// # Errors
    ///
    /// Same as [`Self::next`].
    pub fn previous(&mut self) -> Result<(), PlaybackError> {
        self.ensure_active()?;
        let len = self.playlist.len();
        if len == 0 {
            return Err(PlaybackError::EmptyPlaylist);
        }

        let index = (self.current_index % len + len - 1) % len;
        self.navigate_to(index)
    }

    /// Jumps to `index` and plays it.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::IndexOutOfRange` for an invalid index, plus
    /// the errors of [`Self::play`].
    pub fn select(&mut self, index: usize) -> Result<(), PlaybackError> {
        self.ensure_active()?;
        self.target_at(index)?;
        self.current_index = index;
        self.play()
    }

    /// Explicit navigation: user action beats residual error state.
    ///
    /// Playing intent carries over. A terminal failure counts as playing
    /// unless the user also paused explicitly.
    fn navigate_to(&mut self, index: usize) -> Result<(), PlaybackError> {
        let target = self.target_at(index)?;
        let failed = self.state.get_snapshot().failure.is_some();
        let was_playing =
            self.intent || (failed && !self.registry.snapshot().explicitly_paused);

        self.registry.clear_interruption();
        self.current_index = index;
        self.state.update(|snapshot| snapshot.failure = None);

        if was_playing {
            self.intent = true;
            self.registry.clear_explicit_pause();
            self.state.update(|snapshot| snapshot.is_playing = true);
            self.load_target(target)?;
            self.attempt_play();
        } else {
            self.teardown_session();
            self.state.update(|snapshot| {
                snapshot.current_index = index;
                snapshot.current_track = Some(target);
                snapshot.loading = false;
            });
        }
        Ok(())
    }

    /// Replaces the current cycle with a fresh one for `target`.
    ///
    /// The previous controller is detached and its timers cancelled. The
    /// controller is chosen from the URL; adaptive URLs play directly when no
    /// supported adaptive client is available. Load and play retry handlers
    /// start from zero.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError::Registry` if the element is not ours.
    pub fn load_target(&mut self, target: StreamTarget) -> Result<(), PlaybackError> {
        self.teardown_session();
        self.registry.ensure_initialized();

        let controller: Box<dyn StreamController> =
            match (detect_stream_format(&target.url), self.adaptive_factory.as_ref()) {
                (StreamKind::Adaptive, Some(factory)) if factory.is_supported() => {
                    Box::new(AdaptiveStreamController::new(
                        &target.url,
                        factory.create(&self.policy.adaptive),
                    ))
                }
                (StreamKind::Adaptive, _) => {
                    debug!(url = %target.url, "No adaptive client, playing natively");
                    Box::new(DirectStreamController::new(&target.url))
                }
                (StreamKind::Direct, _) => Box::new(DirectStreamController::new(&target.url)),
            };

        let mut session = PlaybackSession::new(
            target.clone(),
            controller,
            self.policy.load_retry(),
            self.policy.play_retry(),
        );
        let outputs = self
            .registry
            .with_element(self.owner, |element| session.attach(element))?;

        info!(
            url = %target.url,
            kind = ?session.kind(),
            cycle = session.cycle().value(),
            "Loading target"
        );
        self.session = Some(session);

        let index = self.current_index;
        self.state.update(|snapshot| {
            snapshot.current_track = Some(target);
            snapshot.current_index = index;
        });
        self.apply_outputs(outputs);
        Ok(())
    }

    fn teardown_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        session.cancel_all(self.scheduler.as_mut());
        if self
            .registry
            .with_element(self.owner, |element| session.detach(Some(element)))
            .is_err()
        {
            session.detach(None);
        }
        debug!(url = session.url(), cycle = session.cycle().value(), "Session torn down");
    }

    /// Issues the platform play request. The outcome arrives as an event.
    fn attempt_play(&mut self) {
        if let Err(e) = self
            .registry
            .with_element(self.owner, |element| element.play())
            .add_context("Failed to request playback")
        {
            ErrorReporter::warn(&e, "orchestrator");
        }
    }

    /// Feeds a native element event.
    ///
    /// The registry sees it first, then the current controller.
    pub fn handle_media_event(&mut self, event: MediaEvent) {
        self.registry.handle_native_event(&event);

        match &event {
            MediaEvent::Playing => {
                if let Some(session) = self.session.as_mut() {
                    session.play_retry_mut().reset();
                }
            }
            MediaEvent::Pause => {
                if self.intent && self.registry.snapshot().explicitly_paused {
                    info!("Element paused outside the engine, dropping intent");
                    self.intent = false;
                    self.halt();
                }
            }
            MediaEvent::PlayRejected { reason } => {
                self.play_rejected(reason);
                return;
            }
            _ => {}
        }

        let outputs = match self.session.as_mut() {
            Some(session) => session.handle_media_event(&event),
            None => return,
        };
        self.apply_outputs(outputs);
    }

    /// Feeds an adaptive client event to the current controller.
    pub fn handle_adaptive_event(&mut self, event: AdaptiveEvent) {
        let outputs = match self.session.as_mut() {
            Some(session) => session.handle_adaptive_event(&event),
            None => {
                debug!(?event, "Adaptive event without a session");
                return;
            }
        };
        self.apply_outputs(outputs);
    }

    fn play_rejected(&mut self, reason: &str) {
        if !self.intent {
            debug!(reason, "Play rejection after pause ignored");
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let play_retry = session.play_retry_mut();
        if play_retry.should_retry() {
            let delay = play_retry.get_delay();
            play_retry.increment_retry();
            info!(
                reason,
                attempt = play_retry.get_retry_count(),
                delay_ms = delay.as_millis() as u64,
                "Play request rejected, retrying"
            );
            session.schedule(self.scheduler.as_mut(), delay, TimerPurpose::PlayRetry);
        } else {
            let attempts = play_retry.get_retry_count();
            let failure = PlaybackFailure::new(
                session.target().url.clone(),
                FailureKind::PlayRetriesExhausted { attempts },
            );
            self.fail(failure);
        }
    }

    /// Routes an expired timer.
    ///
    /// Timers from another attach cycle, or cancelled ones, are dropped.
    pub fn handle_timer(&mut self, handle: TimerHandle) {
        if self.grace_timer == Some(handle) {
            self.grace_timer = None;
            self.registry.set_navigation_state(false);
            self.resume_after_navigation();
            return;
        }

        let Some(session) = self.session.as_mut() else {
            debug!(timer = handle.id, "Timer without a session dropped");
            return;
        };
        let Some(purpose) = session.take_timer(handle) else {
            debug!(
                timer = handle.id,
                token = handle.token.value(),
                current = session.cycle().value(),
                "Stale timer dropped"
            );
            return;
        };

        match purpose {
            TimerPurpose::LoadTimeout => {
                let outputs = session.handle_load_timeout();
                self.apply_outputs(outputs);
            }
            TimerPurpose::Recovery(action) => {
                if !self.intent {
                    session.mark_needs_reload();
                    return;
                }
                match self
                    .registry
                    .with_element(self.owner, |element| session.run_recovery(action, element))
                {
                    Ok(outputs) => self.apply_outputs(outputs),
                    Err(e) => warn!(?action, "Recovery skipped: {e}"),
                }
            }
            TimerPurpose::PlayRetry => {
                if self.intent {
                    self.attempt_play();
                }
            }
        }
    }

    fn apply_outputs(&mut self, outputs: Vec<ControllerOutput>) {
        for output in outputs {
            match output {
                ControllerOutput::SetLoading(loading) => {
                    self.state.update(|snapshot| snapshot.loading = loading);
                }
                ControllerOutput::CancelLoadTimeout => {
                    if let Some(session) = self.session.as_mut() {
                        session.cancel_purpose(self.scheduler.as_mut(), TimerPurpose::LoadTimeout);
                    }
                }
                ControllerOutput::ArmLoadTimeout => {
                    if let Some(session) = self.session.as_mut() {
                        let window = self.policy.load_timeout(session.load_retry().get_delay());
                        session.schedule(
                            self.scheduler.as_mut(),
                            window,
                            TimerPurpose::LoadTimeout,
                        );
                    }
                }
                ControllerOutput::ScheduleRecovery { delay, action } => {
                    self.registry.mark_interrupted();
                    if let Some(session) = self.session.as_mut() {
                        if self.intent {
                            session.schedule(
                                self.scheduler.as_mut(),
                                delay,
                                TimerPurpose::Recovery(action),
                            );
                        } else {
                            debug!(?action, "Recovery deferred until play");
                            session.mark_needs_reload();
                        }
                    }
                }
                ControllerOutput::ResumePlayback => {
                    if self.intent {
                        self.attempt_play();
                    }
                }
                ControllerOutput::RecoveryResolved => {
                    if let Some(session) = self.session.as_mut() {
                        session.cancel_recoveries(self.scheduler.as_mut());
                    }
                    self.registry.clear_interruption();
                }
                ControllerOutput::Terminal(failure) => self.fail(failure),
            }
        }
    }

    /// Terminal failure: intent off, loading off, failure observable.
    fn fail(&mut self, failure: PlaybackFailure) {
        if let Some(session) = self.session.as_mut() {
            session.cancel_all(self.scheduler.as_mut());
        }
        self.registry.mark_interrupted();
        if let Err(e) = self
            .registry
            .with_element(self.owner, |element| element.pause())
            .add_context("Failed to stop element after terminal failure")
        {
            ErrorReporter::debug(&e, "orchestrator");
        }

        self.intent = false;
        ErrorReporter::failure(&failure);
        self.state.report_failure(failure);
    }

    /// Applies and persists a volume.
    ///
    /// # Returns
    ///
    /// The applied volume, clamped to `0.0..=1.0`.
    ///
    /// # Errors
    ///
    /// Returns `PlaybackError` if the orchestrator is not mounted or another
    /// orchestrator owns the element. Nothing is applied or persisted then.
    pub fn set_volume(&mut self, volume: f32) -> Result<f32, PlaybackError> {
        self.ensure_active()?;
        let volume = self.registry.set_volume(self.owner, volume)?;
        self.volume = volume;
        self.preferences.set_volume(volume);
        self.state.update(|snapshot| snapshot.volume = volume);
        Ok(volume)
    }

    /// Enables or disables random order for [`Self::next`], and persists it.
    pub fn set_random_mode(&mut self, enabled: bool) {
        self.random_mode = enabled;
        self.preferences.set_random_mode(enabled);
    }

    #[must_use]
    pub fn random_mode(&self) -> bool {
        self.random_mode
    }

    /// Re-reads the playlist after the catalog provider replaced it.
    ///
    /// If the current target is still listed, only the index moves. If it
    /// was removed, playback stops and the position returns to the start.
    pub fn resync_playlist(&mut self) {
        let current_url = self
            .session
            .as_ref()
            .map(|session| session.target().url.clone())
            .or_else(|| {
                self.state
                    .get_snapshot()
                    .current_track
                    .map(|track| track.url)
            });

        match current_url.as_deref().and_then(|url| self.playlist.position_of(url)) {
            Some(index) => {
                self.current_index = index;
                self.state.update(|snapshot| snapshot.current_index = index);
            }
            None => {
                if self.session.is_some() && self.intent {
                    info!("Current target removed from playlist, stopping");
                    if let Err(e) = self
                        .registry
                        .with_element(self.owner, |element| element.pause())
                        .add_context("Failed to stop removed target")
                    {
                        ErrorReporter::warn(&e, "orchestrator");
                    }
                }
                self.teardown_session();
                self.intent = false;
                self.current_index = 0;
                let first = self.playlist.get(0);
                self.state.update(|snapshot| {
                    snapshot.current_index = 0;
                    snapshot.current_track = first;
                    snapshot.is_playing = false;
                    snapshot.loading = false;
                });
            }
        }
    }

    /// Observable state.
    #[must_use]
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.state.get_snapshot()
    }

    #[must_use]
    pub fn player_state(&self) -> &PlayerState {
        &self.state
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.intent
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Phase of the current attach cycle.
    #[must_use]
    pub fn phase(&self) -> Option<AttachPhase> {
        self.session.as_ref().map(PlaybackSession::phase)
    }

    /// Controller flavour of the current attach cycle.
    #[must_use]
    pub fn stream_kind(&self) -> Option<StreamKind> {
        self.session.as_ref().map(PlaybackSession::kind)
    }

    #[must_use]
    pub fn load_retry_state(&self) -> Option<RetryState> {
        self.session
            .as_ref()
            .map(|session| session.load_retry().state())
    }

    #[must_use]
    pub fn play_retry_state(&self) -> Option<RetryState> {
        self.session
            .as_ref()
            .map(|session| session.play_retry().state())
    }

    /// Timers pending for the current attach cycle.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, PlaybackSession::pending_timers)
    }
}
