//! Observable player state with broadcast notifications.
//!
//! The presentation layer reads a [`PlayerSnapshot`] and subscribes to
//! [`PlayerStateEvent`]s. Terminal stream failures are represented here as
//! data, never as errors.

use std::sync::Arc;

use {
    parking_lot::RwLock,
    serde::{Deserialize, Serialize},
    tokio::sync::broadcast::{Receiver, Sender, channel},
};

use crate::catalog::StreamTarget;

/// Why playback stopped for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Load retries were spent without the stream becoming ready.
    LoadRetriesExhausted { attempts: u32 },
    /// Play requests kept being refused.
    PlayRetriesExhausted { attempts: u32 },
    /// The adaptive client reported an error class with no recovery.
    Unrecoverable { details: String },
}

/// A terminal failure, observable by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackFailure {
    /// URL of the failed target.
    pub url: String,
    /// Failure class.
    pub kind: FailureKind,
    /// Human readable message.
    pub message: String,
}

impl PlaybackFailure {
    /// Creates a failure with a message derived from the kind.
    #[must_use]
    pub fn new(url: impl Into<String>, kind: FailureKind) -> Self {
        let message = match &kind {
            FailureKind::LoadRetriesExhausted { attempts } => {
                format!("Stream failed to load after {attempts} retries")
            }
            FailureKind::PlayRetriesExhausted { attempts } => {
                format!("Playback was refused after {attempts} retries")
            }
            FailureKind::Unrecoverable { details } => {
                format!("Unrecoverable stream error: {details}")
            }
        };
        Self {
            url: url.into(),
            kind,
            message,
        }
    }
}

/// Externally observable playback state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// Target the engine is attached to, if any.
    pub current_track: Option<StreamTarget>,
    /// User intent: `true` while the user wants audio.
    pub is_playing: bool,
    /// `true` while waiting for the current target to become ready.
    pub loading: bool,
    /// Index of the current target in the playlist.
    pub current_index: usize,
    /// Last terminal failure; cleared by the next user action.
    pub failure: Option<PlaybackFailure>,
    /// Output volume.
    pub volume: f32,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            current_track: None,
            is_playing: false,
            loading: false,
            current_index: 0,
            failure: None,
            volume: 1.0,
        }
    }
}

/// Player state change events.
#[derive(Debug, Clone)]
pub enum PlayerStateEvent {
    /// Any snapshot field changed.
    SnapshotChanged(PlayerSnapshot),
    /// A stream failed terminally.
    TerminalFailure(PlaybackFailure),
}

/// Shared snapshot plus a broadcast channel of changes.
#[derive(Debug, Clone)]
pub struct PlayerState {
    /// Current snapshot.
    snapshot: Arc<RwLock<PlayerSnapshot>>,
    /// Broadcast channel for state change notifications.
    state_tx: Sender<PlayerStateEvent>,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerState {
    /// Creates a state container holding the default snapshot.
    #[must_use]
    pub fn new() -> Self {
        let (state_tx, _) = channel(64);
        Self {
            snapshot: Arc::new(RwLock::new(PlayerSnapshot::default())),
            state_tx,
        }
    }

    /// Applies `change` and notifies subscribers if anything changed.
    ///
    /// # Returns
    ///
    /// `true` if the snapshot changed.
    pub fn update(&self, change: impl FnOnce(&mut PlayerSnapshot)) -> bool {
        let updated = {
            let mut snapshot = self.snapshot.write();
            let before = snapshot.clone();
            change(&mut snapshot);
            (*snapshot != before).then(|| snapshot.clone())
        };

        match updated {
            Some(snapshot) => {
                let _ = self.state_tx.send(PlayerStateEvent::SnapshotChanged(snapshot));
                true
            }
            None => false,
        }
    }

    /// Records a terminal failure: intent off, loading off, failure visible.
    pub fn report_failure(&self, failure: PlaybackFailure) {
        self.update(|snapshot| {
            snapshot.is_playing = false;
            snapshot.loading = false;
            snapshot.failure = Some(failure.clone());
        });
        let _ = self
            .state_tx
            .send(PlayerStateEvent::TerminalFailure(failure));
    }

    /// Current snapshot.
    #[must_use]
    pub fn get_snapshot(&self) -> PlayerSnapshot {
        self.snapshot.read().clone()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<PlayerStateEvent> {
        self.state_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        catalog::StreamTarget,
        state::player_state::{
            FailureKind, PlaybackFailure, PlayerSnapshot, PlayerState, PlayerStateEvent,
        },
    };

    #[test]
    fn test_snapshot_default() {
        let snapshot = PlayerSnapshot::default();
        assert!(snapshot.current_track.is_none());
        assert!(!snapshot.is_playing);
        assert!(!snapshot.loading);
        assert_eq!(snapshot.current_index, 0);
        assert!(snapshot.failure.is_none());
    }

    #[test]
    fn test_update_broadcasts_only_on_change() {
        let state = PlayerState::new();
        let mut receiver = state.subscribe();

        assert!(!state.update(|snapshot| snapshot.loading = false));
        assert!(receiver.try_recv().is_err());

        assert!(state.update(|snapshot| {
            snapshot.loading = true;
            snapshot.current_track = Some(StreamTarget::new("a", "A"));
        }));
        match receiver.try_recv().unwrap() {
            PlayerStateEvent::SnapshotChanged(snapshot) => assert!(snapshot.loading),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_report_failure_forces_intent_off() {
        let state = PlayerState::new();
        state.update(|snapshot| {
            snapshot.is_playing = true;
            snapshot.loading = true;
        });
        let mut receiver = state.subscribe();

        let failure = PlaybackFailure::new("a", FailureKind::LoadRetriesExhausted { attempts: 3 });
        state.report_failure(failure.clone());

        let snapshot = state.get_snapshot();
        assert!(!snapshot.is_playing);
        assert!(!snapshot.loading);
        assert_eq!(snapshot.failure, Some(failure));

        assert!(matches!(receiver.try_recv().unwrap(), PlayerStateEvent::SnapshotChanged(_)));
        assert!(matches!(receiver.try_recv().unwrap(), PlayerStateEvent::TerminalFailure(_)));
    }

    #[test]
    fn test_failure_messages() {
        let failure = PlaybackFailure::new("u", FailureKind::PlayRetriesExhausted { attempts: 2 });
        assert_eq!(failure.message, "Playback was refused after 2 retries");

        let failure = PlaybackFailure::new(
            "u",
            FailureKind::Unrecoverable {
                details: "keySystemError".to_string(),
            },
        );
        assert_eq!(failure.message, "Unrecoverable stream error: keySystemError");
    }
}
