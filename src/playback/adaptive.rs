//! Controller for manifest-based (HLS) streams.
//!
//! Segment and manifest fetching belong to an [`AdaptiveClient`] supplied by
//! the host, which runs its own internal retry loop configured through
//! [`AdaptiveConfig`]. This controller only reacts to what the client reports:
//! fatal network and media errors are recovered with the session's load
//! backoff, any other fatal class ends the cycle immediately.

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, info, warn},
};

use crate::{
    hls::{LiveWindow, Playlist},
    playback::{
        controller::{ControllerOutput, RecoveryAction, StreamController, StreamKind},
        media::{MediaElement, MediaEvent},
        phase::{AttachPhase, PhaseTrigger},
        retry::RetryHandler,
    },
    state::{FailureKind, PlaybackFailure},
};

/// Buffering and internal retry tuning handed to the adaptive client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Maximum forward buffer, in seconds.
    pub max_buffer_length_secs: u32,
    /// Maximum forward buffer, in bytes.
    pub max_buffer_size_bytes: u64,
    /// Target durations to stay behind the live edge.
    pub live_sync_duration_count: u32,
    /// Target durations behind the edge before the client resyncs.
    pub live_max_latency_duration_count: u32,
    /// Client-internal fragment fetch retries.
    pub fragment_load_max_retry: u32,
    /// Client-internal fragment retry delay, in milliseconds.
    pub fragment_load_retry_delay_ms: u64,
    /// Client-internal manifest fetch retries.
    pub manifest_load_max_retry: u32,
    /// Client-internal manifest retry delay, in milliseconds.
    pub manifest_load_retry_delay_ms: u64,
    /// Low-latency playlist support.
    pub low_latency_mode: bool,
    /// Allow the client to demux off the main thread.
    pub enable_worker: bool,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            max_buffer_length_secs: 30,
            max_buffer_size_bytes: 60_000_000,
            live_sync_duration_count: 3,
            live_max_latency_duration_count: 10,
            fragment_load_max_retry: 6,
            fragment_load_retry_delay_ms: 1000,
            manifest_load_max_retry: 4,
            manifest_load_retry_delay_ms: 1000,
            low_latency_mode: false,
            enable_worker: true,
        }
    }
}

/// Error classes reported by the adaptive client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdaptiveErrorType {
    /// Manifest or segment fetch failure.
    Network,
    /// Buffer or decode pipeline failure.
    Media,
    /// Transmuxing failure.
    Mux,
    /// DRM failure.
    KeySystem,
    /// Anything else.
    Other,
}

/// Error reported by the adaptive client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveError {
    /// The client stopped operating.
    pub fatal: bool,
    /// Error class.
    pub error_type: AdaptiveErrorType,
    /// Client-specific detail code.
    pub details: String,
}

/// What the controller learns from a parsed manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestSummary {
    /// Number of quality levels (1 for a media playlist).
    pub levels: usize,
    /// Whether the stream is known to be live.
    pub live: bool,
    /// Target segment duration in seconds, when known.
    pub target_duration: Option<f64>,
    /// Live sync window, for live media playlists.
    pub live_window: Option<LiveWindow>,
}

impl ManifestSummary {
    /// Summarizes a parsed playlist under `config`'s live window.
    #[must_use]
    pub fn from_playlist(playlist: &Playlist, config: &AdaptiveConfig) -> Self {
        match playlist {
            Playlist::Master(master) => Self {
                levels: master.variants.len(),
                live: false,
                target_duration: None,
                live_window: None,
            },
            Playlist::Media(media) => Self {
                levels: 1,
                live: media.is_live(),
                target_duration: Some(media.target_duration),
                live_window: media.live_window(
                    config.live_sync_duration_count,
                    config.live_max_latency_duration_count,
                ),
            },
        }
    }
}

/// Events reported by the adaptive client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AdaptiveEvent {
    /// The client bound itself to the element.
    MediaAttached,
    /// The manifest was fetched and parsed.
    ManifestParsed(ManifestSummary),
    /// A segment was fetched.
    FragmentLoaded { sn: u64 },
    /// Segment data reached the element's buffer.
    BufferAppended,
    /// Something went wrong.
    Error(AdaptiveError),
}

/// Host-provided adaptive streaming client.
pub trait AdaptiveClient: Send {
    /// Starts loading the manifest at `url`.
    fn load_source(&mut self, url: &str);

    /// Binds the client to the process-wide element.
    fn attach_media(&mut self);

    /// Restarts fetching after a network failure.
    fn start_load(&mut self);

    /// Flushes and rebuilds the media pipeline after a media failure.
    fn recover_media_error(&mut self);

    /// Stops all activity and releases the element.
    fn destroy(&mut self);
}

/// Creates adaptive clients.
pub trait AdaptiveClientFactory: Send + Sync {
    /// Whether the platform can run an adaptive client at all.
    fn is_supported(&self) -> bool;

    /// Creates a client configured with `config`.
    fn create(&self, config: &AdaptiveConfig) -> Box<dyn AdaptiveClient>;
}

/// Drives one adaptive client instance.
pub struct AdaptiveStreamController {
    /// Manifest URL.
    url: String,
    /// Attach-cycle phase.
    phase: AttachPhase,
    /// Live client; `None` once destroyed.
    client: Option<Box<dyn AdaptiveClient>>,
    /// Most recent manifest summary.
    manifest: Option<ManifestSummary>,
}

impl AdaptiveStreamController {
    /// Creates an idle controller around a fresh client.
    #[must_use]
    pub fn new(url: impl Into<String>, client: Box<dyn AdaptiveClient>) -> Self {
        Self {
            url: url.into(),
            phase: AttachPhase::Idle,
            client: Some(client),
            manifest: None,
        }
    }

    /// Last manifest summary seen in this cycle.
    #[must_use]
    pub fn manifest(&self) -> Option<&ManifestSummary> {
        self.manifest.as_ref()
    }

    fn destroy_client(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.destroy();
        }
    }

    fn ready(&mut self, load_retry: Option<&mut RetryHandler>) -> Vec<ControllerOutput> {
        if let Some(load_retry) = load_retry {
            load_retry.reset();
        }
        let recovering = self.phase == AttachPhase::Recovering;
        self.phase = self.phase.next(PhaseTrigger::Ready);

        let mut outputs = vec![
            ControllerOutput::SetLoading(false),
            ControllerOutput::CancelLoadTimeout,
        ];
        if recovering {
            debug!(url = %self.url, "Client recovered before the scheduled recovery");
            outputs.push(ControllerOutput::RecoveryResolved);
        }
        outputs
    }

    /// Network or media fatal: recover with backoff while the budget lasts.
    fn recoverable_fatal(
        &mut self,
        action: RecoveryAction,
        load_retry: &mut RetryHandler,
        details: &str,
    ) -> Vec<ControllerOutput> {
        if self.phase == AttachPhase::Recovering {
            debug!(url = %self.url, details, "Fatal error while recovery is pending");
            return Vec::new();
        }

        let retry_allowed = load_retry.should_retry();
        self.phase = self.phase.next(PhaseTrigger::Fault { retry_allowed });

        if retry_allowed {
            let delay = load_retry.get_delay();
            load_retry.increment_retry();
            info!(
                url = %self.url,
                attempt = load_retry.get_retry_count(),
                delay_ms = delay.as_millis() as u64,
                ?action,
                "Fatal adaptive error ({details}), recovering"
            );
            vec![
                ControllerOutput::CancelLoadTimeout,
                ControllerOutput::ScheduleRecovery { delay, action },
            ]
        } else {
            warn!(url = %self.url, details, "Fatal adaptive error, load retries exhausted");
            self.destroy_client();
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

    fn error(
        &mut self,
        error: &AdaptiveError,
        load_retry: &mut RetryHandler,
    ) -> Vec<ControllerOutput> {
        if !error.fatal {
            debug!(
                url = %self.url,
                error_type = ?error.error_type,
                details = %error.details,
                "Non-fatal adaptive error"
            );
            return Vec::new();
        }

        match error.error_type {
            AdaptiveErrorType::Network => self.recoverable_fatal(
                RecoveryAction::RestartAdaptiveLoad,
                load_retry,
                &error.details,
            ),
            AdaptiveErrorType::Media => self.recoverable_fatal(
                RecoveryAction::RecoverAdaptiveMedia,
                load_retry,
                &error.details,
            ),
            AdaptiveErrorType::Mux | AdaptiveErrorType::KeySystem | AdaptiveErrorType::Other => {
                warn!(
                    url = %self.url,
                    error_type = ?error.error_type,
                    details = %error.details,
                    "Unrecoverable adaptive error"
                );
                self.destroy_client();
                self.phase = self.phase.next(PhaseTrigger::Unrecoverable);
                vec![
                    ControllerOutput::CancelLoadTimeout,
                    ControllerOutput::Terminal(PlaybackFailure::new(
                        self.url.clone(),
                        FailureKind::Unrecoverable {
                            details: format!("{:?}: {}", error.error_type, error.details),
                        },
                    )),
                ]
            }
        }
    }
}

impl StreamController for AdaptiveStreamController {
    fn kind(&self) -> StreamKind {
        StreamKind::Adaptive
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn phase(&self) -> AttachPhase {
        self.phase
    }

    fn attach(&mut self, _element: &mut dyn MediaElement) -> Vec<ControllerOutput> {
        let Some(client) = self.client.as_mut() else {
            warn!(url = %self.url, "Attach after the adaptive client was destroyed");
            return Vec::new();
        };

        client.load_source(&self.url);
        client.attach_media();
        self.phase = self.phase.next(PhaseTrigger::Attach);
        debug!(url = %self.url, "Adaptive stream attached");

        vec![
            ControllerOutput::SetLoading(true),
            ControllerOutput::ArmLoadTimeout,
        ]
    }

    fn handle_media_event(
        &mut self,
        event: &MediaEvent,
        _load_retry: &mut RetryHandler,
    ) -> Vec<ControllerOutput> {
        if self.client.is_none() {
            return Vec::new();
        }
        match event {
            MediaEvent::Progress { buffered_ranges } if *buffered_ranges > 0 => {
                vec![ControllerOutput::SetLoading(false)]
            }
            _ => Vec::new(),
        }
    }

    fn handle_adaptive_event(
        &mut self,
        event: &AdaptiveEvent,
        load_retry: &mut RetryHandler,
    ) -> Vec<ControllerOutput> {
        if self.client.is_none() || self.phase.is_terminal() {
            return Vec::new();
        }

        match event {
            AdaptiveEvent::MediaAttached => {
                debug!(url = %self.url, "Adaptive client attached to media");
                Vec::new()
            }
            AdaptiveEvent::ManifestParsed(summary) => {
                info!(
                    url = %self.url,
                    levels = summary.levels,
                    live = summary.live,
                    sync_position = summary.live_window.map(|w| w.sync_position),
                    "Manifest parsed"
                );
                self.manifest = Some(summary.clone());
                self.ready(Some(load_retry))
            }
            AdaptiveEvent::FragmentLoaded { .. } | AdaptiveEvent::BufferAppended => {
                self.ready(None)
            }
            AdaptiveEvent::Error(error) => self.error(error, load_retry),
        }
    }

    fn handle_load_timeout(&mut self, load_retry: &mut RetryHandler) -> Vec<ControllerOutput> {
        if self.client.is_none() || self.phase != AttachPhase::Loading {
            return Vec::new();
        }
        self.recoverable_fatal(RecoveryAction::RestartAdaptiveLoad, load_retry, "load timeout")
    }

    fn run_recovery(
        &mut self,
        action: RecoveryAction,
        _element: &mut dyn MediaElement,
    ) -> Vec<ControllerOutput> {
        if self.phase != AttachPhase::Recovering {
            debug!(url = %self.url, phase = ?self.phase, "Recovery no longer needed");
            return Vec::new();
        }
        let Some(client) = self.client.as_mut() else {
            return Vec::new();
        };

        match action {
            RecoveryAction::RestartAdaptiveLoad => client.start_load(),
            RecoveryAction::RecoverAdaptiveMedia => client.recover_media_error(),
            RecoveryAction::ReloadPermissive | RecoveryAction::ReloadSameSource => {
                warn!(url = %self.url, ?action, "Direct recovery on an adaptive stream");
                return Vec::new();
            }
        }
        self.phase = self.phase.next(PhaseTrigger::RetryFired);

        vec![
            ControllerOutput::SetLoading(true),
            ControllerOutput::ArmLoadTimeout,
            ControllerOutput::ResumePlayback,
        ]
    }

    fn detach(&mut self, _element: Option<&mut dyn MediaElement>) {
        self.destroy_client();
        self.phase = self.phase.next(PhaseTrigger::Detach);
        debug!(url = %self.url, "Adaptive stream detached");
    }
}
