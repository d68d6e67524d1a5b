//! Oxstream - Resilient Internet Radio Playback
//!
//! The playback core of an internet radio player. It keeps direct and HLS
//! streams alive across flaky networks and ambiguous element errors, holds a
//! single audio element across host navigation, and exposes one coherent
//! "currently playing" state to the presentation layer.

pub mod catalog;
pub mod config;
pub mod error;
pub mod hls;
pub mod playback;
pub mod state;

// Re-export key types for convenience
pub use {
    catalog::{PlaylistAccessor, SharedPlaylist, StreamTarget},
    config::{InMemoryPreferences, PreferenceStore, RecoveryPolicy, SettingsManager, UserSettings},
    error::{EngineError, PlaybackError, RegistryError},
    hls::{ManifestParser, Playlist},
    playback::{
        EngineParts, GlobalPlaybackRegistry, MediaBackend, MediaElement, MediaEvent,
        PlaybackEngine, PlaybackOrchestrator, RetryHandler,
    },
    state::{FailureKind, PlaybackFailure, PlayerSnapshot, PlayerState, PlayerStateEvent},
};
