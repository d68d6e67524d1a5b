//! Deferred callbacks keyed by attach cycle.
//!
//! Every retry, watchdog and grace window in the engine is a timer scheduled
//! through the [`Scheduler`] trait. Timers carry the [`CycleToken`] of the
//! attach cycle that created them, so the orchestrator can reject a stale
//! expiry with a single comparison after the target has changed.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering::Relaxed},
    },
    time::Duration,
};

use {
    async_channel::Sender,
    parking_lot::Mutex,
    tokio::{
        runtime::Handle,
        task::JoinHandle,
        time::{Instant, sleep},
    },
    tracing::debug,
};

/// Process-wide source of cycle identities.
static NEXT_CYCLE: AtomicU64 = AtomicU64::new(1);

/// Identity of one attach cycle (or of one navigation grace window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CycleToken(u64);

impl CycleToken {
    /// Allocates a token never handed out before in this process.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CYCLE.fetch_add(1, Relaxed))
    }

    /// Raw numeric value, for logging.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Cancelable handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    /// Scheduler-unique timer id.
    pub id: u64,
    /// Attach cycle the timer belongs to.
    pub token: CycleToken,
}

/// Schedules deferred expiries.
///
/// Implementations never run engine code themselves: an expired timer is
/// reported back to the event thread as its `TimerHandle`, which the owner
/// then routes to `PlaybackOrchestrator::handle_timer`.
pub trait Scheduler: Send {
    /// Schedules an expiry `delay` from now for the given cycle.
    fn schedule_after(&mut self, delay: Duration, token: CycleToken) -> TimerHandle;

    /// Cancels a pending timer. Unknown or already expired handles are ignored.
    fn cancel(&mut self, handle: TimerHandle);

    /// Time elapsed on this scheduler's clock since it was created.
    fn now(&self) -> Duration;
}

/// A timer recorded by [`ManualScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTimer {
    /// Handle returned to the caller.
    pub handle: TimerHandle,
    /// Requested delay.
    pub delay: Duration,
    /// Virtual time at which the timer expires.
    pub deadline: Duration,
}

#[derive(Debug, Default)]
struct ManualClock {
    now: Duration,
    next_id: u64,
    pending: BTreeMap<u64, ScheduledTimer>,
    history: Vec<ScheduledTimer>,
}

/// Virtual-clock scheduler.
///
/// Nothing fires on its own: the host advances the clock and feeds the
/// returned handles to the orchestrator. Clones share the same clock, so a
/// host can keep one clone while the orchestrator owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    clock: Arc<Mutex<ManualClock>>,
}

impl ManualScheduler {
    /// Creates a scheduler at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock and returns the timers that expired, in deadline order.
    pub fn advance(&self, by: Duration) -> Vec<TimerHandle> {
        let mut clock = self.clock.lock();
        clock.now += by;
        let now = clock.now;

        let mut due: Vec<ScheduledTimer> = clock
            .pending
            .values()
            .filter(|timer| timer.deadline <= now)
            .copied()
            .collect();
        due.sort_by_key(|timer| (timer.deadline, timer.handle.id));

        for timer in &due {
            clock.pending.remove(&timer.handle.id);
        }

        due.into_iter().map(|timer| timer.handle).collect()
    }

    /// Timers still waiting to expire.
    #[must_use]
    pub fn pending(&self) -> Vec<ScheduledTimer> {
        self.clock.lock().pending.values().copied().collect()
    }

    /// Every timer ever scheduled, including cancelled and expired ones.
    #[must_use]
    pub fn history(&self) -> Vec<ScheduledTimer> {
        self.clock.lock().history.clone()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_after(&mut self, delay: Duration, token: CycleToken) -> TimerHandle {
        let mut clock = self.clock.lock();
        clock.next_id += 1;
        let handle = TimerHandle {
            id: clock.next_id,
            token,
        };
        let timer = ScheduledTimer {
            handle,
            delay,
            deadline: clock.now + delay,
        };
        clock.pending.insert(handle.id, timer);
        clock.history.push(timer);
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.clock.lock().pending.remove(&handle.id);
    }

    fn now(&self) -> Duration {
        self.clock.lock().now
    }
}

/// Scheduler backed by tokio timers.
///
/// Each timer is a task sleeping on the runtime captured at construction;
/// on expiry the handle is posted to `fired_tx`. Cancelling aborts the task.
pub struct TokioScheduler {
    /// Runtime the sleeping tasks are spawned on.
    runtime: Handle,
    /// Channel receiving expired handles.
    fired_tx: Sender<TimerHandle>,
    /// Live sleeping tasks keyed by timer id.
    tasks: HashMap<u64, JoinHandle<()>>,
    /// Last id handed out.
    next_id: u64,
    /// Creation time, origin of [`Scheduler::now`].
    origin: Instant,
}

impl TokioScheduler {
    /// Creates a scheduler on the current tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `fired_tx` - Channel receiving handles of expired timers.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn new(fired_tx: Sender<TimerHandle>) -> Self {
        Self::with_runtime(Handle::current(), fired_tx)
    }

    /// Creates a scheduler spawning on an explicit runtime handle.
    #[must_use]
    pub fn with_runtime(runtime: Handle, fired_tx: Sender<TimerHandle>) -> Self {
        Self {
            runtime,
            fired_tx,
            tasks: HashMap::new(),
            next_id: 0,
            origin: Instant::now(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_after(&mut self, delay: Duration, token: CycleToken) -> TimerHandle {
        self.tasks.retain(|_, task| !task.is_finished());

        self.next_id += 1;
        let handle = TimerHandle {
            id: self.next_id,
            token,
        };

        let fired_tx = self.fired_tx.clone();
        let task = self.runtime.spawn(async move {
            sleep(delay).await;
            if fired_tx.send(handle).await.is_err() {
                debug!(timer = handle.id, "Timer fired after scheduler shut down");
            }
        });
        self.tasks.insert(handle.id, task);

        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(task) = self.tasks.remove(&handle.id) {
            task.abort();
        }
    }

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}
