//! One attach cycle: target, controller, retry handlers and timers.
//!
//! A session is destroyed and replaced whenever the target changes. Its
//! [`CycleToken`] stamps every timer it schedules; [`PlaybackSession::take_timer`]
//! rejects expiries from other cycles.

use std::{collections::HashMap, mem::take, time::Duration};

use tracing::debug;

use crate::{
    catalog::StreamTarget,
    playback::{
        adaptive::AdaptiveEvent,
        controller::{ControllerOutput, RecoveryAction, StreamController, StreamKind},
        media::{MediaElement, MediaEvent},
        phase::AttachPhase,
        retry::RetryHandler,
        scheduler::{CycleToken, Scheduler, TimerHandle},
    },
};

/// What a session timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPurpose {
    /// Run a controller recovery.
    Recovery(RecoveryAction),
    /// Re-issue a rejected play request.
    PlayRetry,
    /// Readiness watchdog.
    LoadTimeout,
}

#[derive(Debug, Clone, Copy)]
struct PendingTimer {
    handle: TimerHandle,
    purpose: TimerPurpose,
    /// Expiry on the scheduling scheduler's clock.
    deadline: Duration,
}

/// Live state of one attached target.
pub struct PlaybackSession {
    /// Target being played.
    target: StreamTarget,
    /// Identity of this attach cycle.
    cycle: CycleToken,
    /// Direct or adaptive controller.
    controller: Box<dyn StreamController>,
    /// Load-level retries (errors, stalls, fatal adaptive errors, timeouts).
    load_retry: RetryHandler,
    /// Play-request retries.
    play_retry: RetryHandler,
    /// Pending timers keyed by timer id.
    timers: HashMap<u64, PendingTimer>,
    /// Timers cancelled by [`PlaybackSession::suspend_timers`] with the time
    /// they had left.
    suspended: Vec<(TimerPurpose, Duration)>,
    /// Set when a pause interrupted loading or recovery.
    needs_reload: bool,
}

impl PlaybackSession {
    /// Creates a session with a fresh cycle token.
    #[must_use]
    pub fn new(
        target: StreamTarget,
        controller: Box<dyn StreamController>,
        load_retry: RetryHandler,
        play_retry: RetryHandler,
    ) -> Self {
        Self {
            target,
            cycle: CycleToken::next(),
            controller,
            load_retry,
            play_retry,
            timers: HashMap::new(),
            suspended: Vec::new(),
            needs_reload: false,
        }
    }

    #[must_use]
    pub fn target(&self) -> &StreamTarget {
        &self.target
    }

    /// URL the controller is attached to.
    #[must_use]
    pub fn url(&self) -> &str {
        self.controller.url()
    }

    #[must_use]
    pub fn cycle(&self) -> CycleToken {
        self.cycle
    }

    #[must_use]
    pub fn kind(&self) -> StreamKind {
        self.controller.kind()
    }

    #[must_use]
    pub fn phase(&self) -> AttachPhase {
        self.controller.phase()
    }

    #[must_use]
    pub fn load_retry(&self) -> &RetryHandler {
        &self.load_retry
    }

    #[must_use]
    pub fn play_retry(&self) -> &RetryHandler {
        &self.play_retry
    }

    pub fn play_retry_mut(&mut self) -> &mut RetryHandler {
        &mut self.play_retry
    }

    #[must_use]
    pub fn needs_reload(&self) -> bool {
        self.needs_reload
    }

    pub fn mark_needs_reload(&mut self) {
        self.needs_reload = true;
    }

    pub fn attach(&mut self, element: &mut dyn MediaElement) -> Vec<ControllerOutput> {
        self.controller.attach(element)
    }

    pub fn detach(&mut self, element: Option<&mut dyn MediaElement>) {
        self.controller.detach(element);
    }

    pub fn handle_media_event(&mut self, event: &MediaEvent) -> Vec<ControllerOutput> {
        self.controller.handle_media_event(event, &mut self.load_retry)
    }

    pub fn handle_adaptive_event(&mut self, event: &AdaptiveEvent) -> Vec<ControllerOutput> {
        self.controller.handle_adaptive_event(event, &mut self.load_retry)
    }

    pub fn handle_load_timeout(&mut self) -> Vec<ControllerOutput> {
        self.controller.handle_load_timeout(&mut self.load_retry)
    }

    pub fn run_recovery(
        &mut self,
        action: RecoveryAction,
        element: &mut dyn MediaElement,
    ) -> Vec<ControllerOutput> {
        self.controller.run_recovery(action, element)
    }

    /// Schedules a timer for this cycle.
    ///
    /// Only one watchdog exists per cycle: arming a `LoadTimeout` replaces
    /// the previous one.
    pub fn schedule(
        &mut self,
        scheduler: &mut dyn Scheduler,
        delay: Duration,
        purpose: TimerPurpose,
    ) -> TimerHandle {
        if purpose == TimerPurpose::LoadTimeout {
            self.cancel_purpose(scheduler, TimerPurpose::LoadTimeout);
        }

        let handle = scheduler.schedule_after(delay, self.cycle);
        self.timers.insert(
            handle.id,
            PendingTimer {
                handle,
                purpose,
                deadline: scheduler.now() + delay,
            },
        );
        debug!(
            url = self.controller.url(),
            cycle = self.cycle.value(),
            timer = handle.id,
            ?purpose,
            delay_ms = delay.as_millis() as u64,
            "Timer scheduled"
        );
        handle
    }

    /// Claims an expired timer.
    ///
    /// # Returns
    ///
    /// The timer's purpose, or `None` if it belongs to another cycle or was
    /// cancelled.
    pub fn take_timer(&mut self, handle: TimerHandle) -> Option<TimerPurpose> {
        if handle.token != self.cycle {
            return None;
        }
        self.timers.remove(&handle.id).map(|timer| timer.purpose)
    }

    /// Cancels every pending timer with the given purpose.
    pub fn cancel_purpose(&mut self, scheduler: &mut dyn Scheduler, purpose: TimerPurpose) {
        self.timers.retain(|_, timer| {
            if timer.purpose == purpose {
                scheduler.cancel(timer.handle);
                false
            } else {
                true
            }
        });
    }

    /// Cancels every pending recovery, whatever its action.
    pub fn cancel_recoveries(&mut self, scheduler: &mut dyn Scheduler) {
        self.timers.retain(|_, timer| {
            if matches!(timer.purpose, TimerPurpose::Recovery(_)) {
                scheduler.cancel(timer.handle);
                false
            } else {
                true
            }
        });
    }

    /// Cancels every pending timer of this cycle.
    pub fn cancel_all(&mut self, scheduler: &mut dyn Scheduler) {
        for (_, timer) in self.timers.drain() {
            scheduler.cancel(timer.handle);
        }
        self.suspended.clear();
    }

    /// Cancels pending timers but remembers the time each had left, for
    /// [`PlaybackSession::resume_timers`].
    pub fn suspend_timers(&mut self, scheduler: &mut dyn Scheduler) {
        let now = scheduler.now();
        let mut timers: Vec<PendingTimer> = self.timers.drain().map(|(_, timer)| timer).collect();
        timers.sort_by_key(|timer| timer.handle.id);
        for timer in timers {
            scheduler.cancel(timer.handle);
            self.suspended.push((timer.purpose, timer.deadline.saturating_sub(now)));
        }
    }

    /// Reschedules suspended timers on `scheduler` with the time they had
    /// left. Time spent parked between owners does not count.
    pub fn resume_timers(&mut self, scheduler: &mut dyn Scheduler) {
        for (purpose, delay) in take(&mut self.suspended) {
            self.schedule(scheduler, delay, purpose);
        }
    }

    /// Number of timers pending for this cycle.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Whether a timer with `purpose` is pending.
    #[must_use]
    pub fn has_pending(&self, purpose: TimerPurpose) -> bool {
        self.timers.values().any(|timer| timer.purpose == purpose)
    }
}

/// Playback handed from an unmounting orchestrator to the next one.
pub struct ParkedPlayback {
    /// Live session, if any; its timers are suspended.
    pub session: Option<PlaybackSession>,
    /// User intent at hand-off.
    pub intent: bool,
    /// Playlist position at hand-off.
    pub current_index: usize,
}
