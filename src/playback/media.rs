//! Abstract media element and its native events.
//!
//! The platform element (a browser audio tag, a native player, a test fake)
//! sits behind [`MediaElement`]. Commands are fire-and-forget; outcomes come
//! back asynchronously as [`MediaEvent`]s fed to the orchestrator.

use serde::{Deserialize, Serialize};

/// Cross-origin mode used when fetching a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorsMode {
    /// CORS request without credentials.
    Anonymous,
    /// No cross-origin attribute at all; used as the fallback after a failed load.
    Permissive,
}

/// Preload hint for the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreloadMode {
    /// Do not fetch until playback is requested.
    None,
    /// Fetch metadata only.
    Metadata,
    /// Fetch as much as the platform allows.
    Auto,
}

/// Creation options for the single audio element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementConfig {
    /// Start playback as soon as a source is ready.
    pub autoplay: bool,
    /// Cross-origin mode for the initial fetch.
    pub cross_origin: CorsMode,
    /// Allow playback without entering fullscreen on mobile platforms.
    pub plays_inline: bool,
    /// Preload behaviour.
    pub preload: PreloadMode,
}

impl Default for ElementConfig {
    fn default() -> Self {
        Self {
            autoplay: false,
            cross_origin: CorsMode::Anonymous,
            plays_inline: true,
            preload: PreloadMode::Auto,
        }
    }
}

/// Native media error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaErrorKind {
    /// Fetch aborted by the user agent.
    Aborted,
    /// Network failure while fetching.
    Network,
    /// Data could not be decoded.
    Decode,
    /// Source format or URL not supported.
    SourceNotSupported,
}

/// Events emitted by the platform element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MediaEvent {
    /// A fetch for the current source started.
    LoadStart,
    /// Enough data is available to start playback.
    CanPlay,
    /// Data arrived; `buffered_ranges` is the number of buffered time ranges.
    Progress { buffered_ranges: usize },
    /// The fetch stopped delivering data.
    Stalled,
    /// Loading failed.
    Error(MediaErrorKind),
    /// Playback was requested (native `play`).
    Play,
    /// Playback actually started or resumed.
    Playing,
    /// The element paused, for whatever reason.
    Pause,
    /// The source reached its end.
    Ended,
    /// A play request was refused (autoplay policy, resource busy).
    PlayRejected { reason: String },
}

/// The platform audio element.
pub trait MediaElement: Send {
    /// Points the element at a new source without loading it.
    fn set_source(&mut self, url: &str, cors: CorsMode);

    /// Starts (or restarts) fetching the current source.
    fn load(&mut self);

    /// Requests playback. The outcome arrives as `Playing` or `PlayRejected`.
    fn play(&mut self);

    /// Pauses playback.
    fn pause(&mut self);

    /// Applies a volume in `0.0..=1.0`.
    fn set_volume(&mut self, volume: f32);

    /// Current source URL, if any.
    fn source(&self) -> Option<String>;
}

/// Factory for the platform element.
pub trait MediaBackend: Send + Sync {
    /// Creates the element. Called at most once per registry.
    fn create_element(&self, config: &ElementConfig) -> Box<dyn MediaElement>;
}
