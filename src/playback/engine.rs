//! Threaded driver around the orchestrator.
//!
//! `PlaybackEngine` owns a dedicated thread running a current-thread tokio
//! runtime. User commands, element events and adaptive client events arrive
//! through one control channel; timer expiries arrive through a second one
//! fed by a [`TokioScheduler`]. Both are drained by a single loop, so the
//! orchestrator only ever runs on that thread.

use std::{
    sync::Arc,
    thread::{Builder as ThreadBuilder, JoinHandle},
};

use {
    async_channel::{Receiver, Sender, unbounded},
    parking_lot::Mutex,
    tokio::{runtime::Builder, select, sync::broadcast},
    tracing::{debug, error},
};

use crate::{
    catalog::{SharedPlaylist, StreamTarget},
    config::{PreferenceStore, RecoveryPolicy},
    error::{EngineError, ErrorReporter, PlaybackError, Result, ResultExt},
    playback::{
        adaptive::{AdaptiveClientFactory, AdaptiveEvent},
        media::MediaEvent,
        orchestrator::PlaybackOrchestrator,
        registry::GlobalPlaybackRegistry,
        scheduler::TokioScheduler,
    },
    state::{PlayerSnapshot, PlayerState, PlayerStateEvent},
};

/// Collaborators handed to the engine thread.
pub struct EngineParts {
    /// Shared element owner.
    pub registry: GlobalPlaybackRegistry,
    /// Target list; the engine keeps a clone for [`PlaybackEngine::set_playlist`].
    pub playlist: SharedPlaylist,
    /// Volume and random-mode persistence.
    pub preferences: Box<dyn PreferenceStore>,
    /// Retry and watchdog tuning.
    pub policy: RecoveryPolicy,
    /// Adaptive client factory, if the platform has one.
    pub adaptive_factory: Option<Arc<dyn AdaptiveClientFactory>>,
}

/// Messages processed by the engine thread.
#[derive(Debug)]
enum EngineMessage {
    Play,
    Pause,
    Next,
    Previous,
    Select(usize),
    SetVolume(f32),
    SetRandomMode(bool),
    PlaylistChanged,
    Media(MediaEvent),
    Adaptive(AdaptiveEvent),
    Shutdown,
}

/// Handle to the playback thread.
///
/// Clones control the same thread. Commands are queued without blocking;
/// their effects are observed through [`PlaybackEngine::snapshot`] and
/// [`PlaybackEngine::subscribe`].
#[derive(Clone)]
pub struct PlaybackEngine {
    /// Sender for control messages.
    control_tx: Sender<EngineMessage>,
    /// Provider side of the target list.
    playlist: SharedPlaylist,
    /// Observable state.
    state: PlayerState,
    /// Engine thread, joined on shutdown.
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl PlaybackEngine {
    /// Starts the engine thread and mounts an orchestrator on it.
    ///
    /// # Arguments
    ///
    /// * `parts` - Collaborators moved to the engine thread.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `PlaybackEngine` or an `EngineError`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Settings` if the recovery policy is inconsistent
    /// and `EngineError::Spawn` if the thread cannot be started.
    pub fn new(parts: EngineParts) -> Result<Self> {
        parts.policy.validate()?;

        let (control_tx, control_rx) = unbounded();
        let state = PlayerState::new();
        let playlist = parts.playlist.clone();

        let thread_state = state.clone();
        let thread = ThreadBuilder::new()
            .name("playback-engine".to_string())
            .spawn(move || control_loop(parts, thread_state, control_rx))?;

        Ok(Self {
            control_tx,
            playlist,
            state,
            thread: Arc::new(Mutex::new(Some(thread))),
        })
    }

    fn send(&self, message: EngineMessage) -> Result<()> {
        self.control_tx
            .try_send(message)
            .map_err(|_| EngineError::ShutDown)
    }

    /// Starts or resumes playback.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ShutDown` if the engine thread is gone.
    pub fn play(&self) -> Result<()> {
        self.send(EngineMessage::Play)
    }

    /// Pauses playback on behalf of the user.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ShutDown` if the engine thread is gone.
    pub fn pause(&self) -> Result<()> {
        self.send(EngineMessage::Pause)
    }

    /// Moves to the next target.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ShutDown` if the engine thread is gone.
    pub fn next(&self) -> Result<()> {
        self.send(EngineMessage::Next)
    }

    /// Moves to the previous target.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ShutDown` if the engine thread is gone.
    pub fn previous(&self) -> Result<()> {
        self.send(EngineMessage::Previous)
    }

    /// Plays the target at `index`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Playback` for an index outside the current
    /// playlist, `EngineError::ShutDown` if the engine thread is gone.
    pub fn select(&self, index: usize) -> Result<()> {
        let len = self.playlist.targets().len();
        if index >= len {
            return Err(PlaybackError::IndexOutOfRange { index, len }.into());
        }
        self.send(EngineMessage::Select(index))
    }

    /// Sets the volume; clamped to `0.0..=1.0` on the engine thread.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ShutDown` if the engine thread is gone.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(EngineMessage::SetVolume(volume))
    }

    /// Enables or disables random order.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ShutDown` if the engine thread is gone.
    pub fn set_random_mode(&self, enabled: bool) -> Result<()> {
        self.send(EngineMessage::SetRandomMode(enabled))
    }

    /// Replaces the target list and re-syncs the position.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ShutDown` if the engine thread is gone.
    pub fn set_playlist(&self, targets: Vec<StreamTarget>) -> Result<()> {
        self.playlist.replace(targets);
        self.send(EngineMessage::PlaylistChanged)
    }

    /// Forwards a native element event.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ShutDown` if the engine thread is gone.
    pub fn post_media_event(&self, event: MediaEvent) -> Result<()> {
        self.send(EngineMessage::Media(event))
    }

    /// Forwards an adaptive client event.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ShutDown` if the engine thread is gone.
    pub fn post_adaptive_event(&self, event: AdaptiveEvent) -> Result<()> {
        self.send(EngineMessage::Adaptive(event))
    }

    /// Current observable state.
    #[must_use]
    pub fn snapshot(&self) -> PlayerSnapshot {
        self.state.get_snapshot()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerStateEvent> {
        self.state.subscribe()
    }

    /// Stops the engine thread and waits for it.
    ///
    /// The orchestrator unmounts on the way out, so a live session stays
    /// parked in the registry for the next engine to adopt.
    pub fn shutdown(&self) {
        debug!("Shutting down playback engine");
        let _ = self.control_tx.try_send(EngineMessage::Shutdown);

        if let Some(thread) = self.thread.lock().take()
            && thread.join().is_err()
        {
            error!("Playback engine thread panicked");
        }
    }
}

/// Body of the engine thread.
fn control_loop(parts: EngineParts, state: PlayerState, control_rx: Receiver<EngineMessage>) {
    let runtime = match Builder::new_current_thread().enable_time().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to build playback runtime: {e}");
            return;
        }
    };

    runtime.block_on(async move {
        let (timer_tx, timer_rx) = unbounded();
        let scheduler = TokioScheduler::new(timer_tx);

        let mut orchestrator = PlaybackOrchestrator::new(
            parts.registry,
            Box::new(parts.playlist),
            Box::new(scheduler),
            parts.preferences,
            parts.policy,
        )
        .with_player_state(state);
        if let Some(factory) = parts.adaptive_factory {
            orchestrator = orchestrator.with_adaptive_factory(factory);
        }
        orchestrator.mount();

        loop {
            select! {
                message = control_rx.recv() => match message {
                    Ok(EngineMessage::Shutdown) | Err(_) => break,
                    Ok(message) => handle_message(&mut orchestrator, message),
                },
                Ok(handle) = timer_rx.recv() => orchestrator.handle_timer(handle),
            }
        }

        orchestrator.unmount();
        debug!("Playback engine stopped");
    });
}

fn handle_message(orchestrator: &mut PlaybackOrchestrator, message: EngineMessage) {
    let result = match message {
        EngineMessage::Play => orchestrator.play().add_context("Failed to play"),
        EngineMessage::Pause => orchestrator.pause().add_context("Failed to pause"),
        EngineMessage::Next => orchestrator.next().add_context("Failed to skip forward"),
        EngineMessage::Previous => orchestrator.previous().add_context("Failed to skip back"),
        EngineMessage::Select(index) => orchestrator
            .select(index)
            .add_contextf(format!("Failed to select target {index}")),
        EngineMessage::SetVolume(volume) => orchestrator
            .set_volume(volume)
            .map(|_| ())
            .add_context("Failed to set volume"),
        EngineMessage::SetRandomMode(enabled) => {
            orchestrator.set_random_mode(enabled);
            Ok(())
        }
        EngineMessage::PlaylistChanged => {
            orchestrator.resync_playlist();
            Ok(())
        }
        EngineMessage::Media(event) => {
            orchestrator.handle_media_event(event);
            Ok(())
        }
        EngineMessage::Adaptive(event) => {
            orchestrator.handle_adaptive_event(event);
            Ok(())
        }
        EngineMessage::Shutdown => Ok(()),
    };

    if let Err(e) = result {
        ErrorReporter::warn(&e, "engine");
    }
}
