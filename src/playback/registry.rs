//! The process-wide audio element and its ownership flags.
//!
//! Exactly one element exists per registry, created lazily and never torn
//! down. Orchestrators come and go with the host's navigation; each one
//! claims ownership on mount, and only the active owner may command the
//! element. The registry also keeps the projection that separates a user
//! pause from an interruption (navigation teardown, stream failure).
//!
//! Hosts install one registry per process with [`GlobalPlaybackRegistry::install`];
//! tests construct independent instances with [`GlobalPlaybackRegistry::new`].

use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU64, Ordering::Relaxed},
};

use {
    parking_lot::Mutex,
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
};

use crate::{
    error::RegistryError,
    playback::{
        media::{ElementConfig, MediaBackend, MediaElement, MediaEvent},
        session::ParkedPlayback,
    },
};

/// The installed process-wide registry.
static GLOBAL_REGISTRY: OnceLock<GlobalPlaybackRegistry> = OnceLock::new();

/// Source of owner identities.
static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Identity of an orchestrator instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocates a new identity.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_OWNER.fetch_add(1, Relaxed))
    }

    /// Raw numeric value.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Read-only copy of the registry flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    /// The element exists.
    pub is_initialized: bool,
    /// The element reports playing.
    pub is_playing: bool,
    /// The last pause came from the user.
    pub explicitly_paused: bool,
    /// A navigation grace window is open.
    pub navigation_in_progress: bool,
    /// Playback was stopped by an error or is recovering from one.
    pub interrupted: bool,
    /// Orchestrator allowed to command the element.
    pub active_owner: Option<OwnerId>,
    /// Element volume.
    pub volume: f32,
}

struct RegistryState {
    element: Option<Box<dyn MediaElement>>,
    is_playing: bool,
    explicitly_paused: bool,
    navigation_in_progress: bool,
    interrupted: bool,
    /// A native pause arrived inside the grace window.
    paused_during_navigation: bool,
    active_owner: Option<OwnerId>,
    volume: f32,
    parked: Option<ParkedPlayback>,
}

impl Default for RegistryState {
    fn default() -> Self {
        Self {
            element: None,
            is_playing: false,
            explicitly_paused: false,
            navigation_in_progress: false,
            interrupted: false,
            paused_during_navigation: false,
            active_owner: None,
            volume: 1.0,
            parked: None,
        }
    }
}

impl RegistryState {
    fn check_owner(&self, owner: OwnerId) -> Result<(), RegistryError> {
        if self.active_owner == Some(owner) {
            Ok(())
        } else {
            Err(RegistryError::NotOwner {
                owner: owner.value(),
                active: self.active_owner.map(OwnerId::value),
            })
        }
    }
}

/// Clamps a requested volume to `0.0..=1.0`; NaN is silence.
#[must_use]
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// Owner of the single audio element.
///
/// Clones share the same element and flags.
#[derive(Clone)]
pub struct GlobalPlaybackRegistry {
    /// Factory for the element.
    backend: Arc<dyn MediaBackend>,
    /// Element and flags.
    state: Arc<Mutex<RegistryState>>,
}

impl GlobalPlaybackRegistry {
    /// Creates an independent registry. The element is not created yet.
    #[must_use]
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(RegistryState::default())),
        }
    }

    /// Installs the process-wide registry.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::AlreadyInstalled` if a registry was installed
    /// before; the existing one stays in place.
    pub fn install(backend: Arc<dyn MediaBackend>) -> Result<&'static Self, RegistryError> {
        let mut installed = false;
        let registry = GLOBAL_REGISTRY.get_or_init(|| {
            installed = true;
            Self::new(backend)
        });

        if installed {
            info!("Process-wide playback registry installed");
            Ok(registry)
        } else {
            Err(RegistryError::AlreadyInstalled)
        }
    }

    /// The process-wide registry, if installed.
    #[must_use]
    pub fn global() -> Option<&'static Self> {
        GLOBAL_REGISTRY.get()
    }

    /// Creates the element on first use.
    ///
    /// The element is created with autoplay off, anonymous CORS, inline
    /// playback and full preloading.
    ///
    /// # Returns
    ///
    /// `true` if the element was created by this call.
    pub fn ensure_initialized(&self) -> bool {
        let mut state = self.state.lock();
        if state.element.is_some() {
            return false;
        }

        let mut element = self.backend.create_element(&ElementConfig::default());
        element.set_volume(state.volume);
        state.element = Some(element);
        debug!("Audio element created");
        true
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.lock().element.is_some()
    }

    /// Makes `owner` the only orchestrator allowed to command the element.
    ///
    /// The element is left untouched: in-flight playback continues.
    pub fn claim_ownership(&self, owner: OwnerId) {
        let previous = self.state.lock().active_owner.replace(owner);
        if previous != Some(owner) {
            info!(
                owner = owner.value(),
                previous = previous.map(OwnerId::value),
                "Playback ownership claimed"
            );
        }
    }

    /// Clears ownership if `owner` still holds it.
    pub fn release_ownership(&self, owner: OwnerId) {
        let mut state = self.state.lock();
        if state.active_owner == Some(owner) {
            state.active_owner = None;
            debug!(owner = owner.value(), "Playback ownership released");
        }
    }

    #[must_use]
    pub fn is_owner(&self, owner: OwnerId) -> bool {
        self.state.lock().active_owner == Some(owner)
    }

    /// Fails unless `owner` may command the element.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotOwner` if another orchestrator holds the
    /// element, or none does.
    pub fn check_owner(&self, owner: OwnerId) -> Result<(), RegistryError> {
        self.state.lock().check_owner(owner)
    }

    /// Runs `command` against the element on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotInitialized` before the element exists and
    /// `RegistryError::NotOwner` if `owner` is not the active owner.
    pub fn with_element<R>(
        &self,
        owner: OwnerId,
        command: impl FnOnce(&mut dyn MediaElement) -> R,
    ) -> Result<R, RegistryError> {
        let mut state = self.state.lock();
        state.check_owner(owner)?;

        match state.element.as_mut() {
            Some(element) => Ok(command(element.as_mut())),
            None => Err(RegistryError::NotInitialized),
        }
    }

    /// Projects a native element event onto the flags.
    pub fn handle_native_event(&self, event: &MediaEvent) {
        match event {
            MediaEvent::Play | MediaEvent::Playing => {
                self.update_playback_state(true, false, false);
                let mut state = self.state.lock();
                state.interrupted = false;
                state.paused_during_navigation = false;
            }
            MediaEvent::Pause => {
                let navigating = {
                    let mut state = self.state.lock();
                    if state.navigation_in_progress {
                        state.paused_during_navigation = true;
                    }
                    state.navigation_in_progress
                };
                if navigating {
                    debug!("Pause during navigation, not treated as user intent");
                }
                self.update_playback_state(false, true, false);
            }
            MediaEvent::Ended => self.update_playback_state(false, false, true),
            _ => {}
        }
    }

    /// Updates the playing flag and the explicit-pause classification.
    ///
    /// Playing always clears the explicit pause. Otherwise `force_explicit`
    /// writes `is_explicit_pause` as is; without it, an explicit pause is
    /// only recorded outside navigation and outside an interruption.
    pub fn update_playback_state(
        &self,
        is_playing: bool,
        is_explicit_pause: bool,
        force_explicit: bool,
    ) {
        let mut state = self.state.lock();
        state.is_playing = is_playing;

        if is_playing {
            state.explicitly_paused = false;
        } else if force_explicit {
            state.explicitly_paused = is_explicit_pause;
        } else if is_explicit_pause && !state.navigation_in_progress && !state.interrupted {
            state.explicitly_paused = true;
        }
    }

    /// Clears the explicit-pause flag ahead of a user play.
    pub fn clear_explicit_pause(&self) {
        self.state.lock().explicitly_paused = false;
    }

    /// Marks playback as stopped or disturbed by an error.
    pub fn mark_interrupted(&self) {
        self.state.lock().interrupted = true;
    }

    /// Clears the interruption flag. Every explicit user action calls this.
    pub fn clear_interruption(&self) {
        self.state.lock().interrupted = false;
    }

    /// Opens or closes the navigation grace window.
    pub fn set_navigation_state(&self, in_progress: bool) {
        let mut state = self.state.lock();
        if in_progress && !state.navigation_in_progress {
            state.paused_during_navigation = false;
        }
        state.navigation_in_progress = in_progress;
        debug!(in_progress, "Navigation state changed");
    }

    /// Returns and clears whether a pause arrived inside the grace window.
    pub fn take_paused_during_navigation(&self) -> bool {
        let mut state = self.state.lock();
        let paused = state.paused_during_navigation;
        state.paused_during_navigation = false;
        paused
    }

    /// Applies a volume on behalf of `owner`, directly to the element and
    /// without reload.
    ///
    /// # Returns
    ///
    /// The volume applied, clamped to `0.0..=1.0`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotOwner` if `owner` is not the active owner;
    /// the stored volume is left untouched.
    pub fn set_volume(&self, owner: OwnerId, volume: f32) -> Result<f32, RegistryError> {
        let volume = clamp_volume(volume);

        let mut state = self.state.lock();
        state.check_owner(owner)?;
        state.volume = volume;
        if let Some(element) = state.element.as_mut() {
            element.set_volume(volume);
        }
        Ok(volume)
    }

    /// Stores playback for the next orchestrator to adopt.
    pub fn park(&self, parked: ParkedPlayback) {
        if self.state.lock().parked.replace(parked).is_some() {
            debug!("Replaced previously parked playback");
        }
    }

    /// Takes parked playback, if any.
    pub fn take_parked(&self) -> Option<ParkedPlayback> {
        self.state.lock().parked.take()
    }

    /// Copy of the flags.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.state.lock();
        RegistrySnapshot {
            is_initialized: state.element.is_some(),
            is_playing: state.is_playing,
            explicitly_paused: state.explicitly_paused,
            navigation_in_progress: state.navigation_in_progress,
            interrupted: state.interrupted,
            active_owner: state.active_owner,
            volume: state.volume,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        error::RegistryError,
        playback::{
            media::{ElementConfig, MediaEvent},
            registry::{GlobalPlaybackRegistry, OwnerId},
            testing::{ElementCommand, FakeBackend},
        },
    };

    fn registry() -> (GlobalPlaybackRegistry, FakeBackend) {
        let backend = FakeBackend::new();
        (GlobalPlaybackRegistry::new(Arc::new(backend.clone())), backend)
    }

    #[test]
    fn test_element_created_once_with_expected_config() {
        let (registry, backend) = registry();
        assert!(!registry.is_initialized());

        assert!(registry.ensure_initialized());
        assert!(!registry.ensure_initialized());

        assert_eq!(backend.created(), 1);
        assert_eq!(backend.configs(), vec![ElementConfig::default()]);
        assert!(!backend.configs()[0].autoplay);
    }

    #[test]
    fn test_only_active_owner_commands_element() {
        let (registry, backend) = registry();
        let first = OwnerId::next();
        let second = OwnerId::next();

        assert_eq!(
            registry.with_element(first, |element| element.play()),
            Err(RegistryError::NotOwner {
                owner: first.value(),
                active: None
            })
        );

        registry.claim_ownership(first);
        assert_eq!(
            registry.with_element(first, |element| element.play()),
            Err(RegistryError::NotInitialized)
        );

        registry.ensure_initialized();
        registry.with_element(first, |element| element.play()).unwrap();

        registry.claim_ownership(second);
        assert!(registry.with_element(first, |element| element.pause()).is_err());
        registry.with_element(second, |element| element.pause()).unwrap();

        assert_eq!(
            backend.element().commands(),
            vec![
                ElementCommand::SetVolume(1.0),
                ElementCommand::Play,
                ElementCommand::Pause
            ]
        );
        assert_eq!(backend.created(), 1);
    }

    #[test]
    fn test_release_only_by_holder() {
        let (registry, _) = registry();
        let first = OwnerId::next();
        let second = OwnerId::next();

        registry.claim_ownership(first);
        registry.claim_ownership(second);
        registry.release_ownership(first);
        assert!(registry.is_owner(second));

        registry.release_ownership(second);
        assert_eq!(registry.snapshot().active_owner, None);
    }

    #[test]
    fn test_native_pause_is_explicit_outside_navigation() {
        let (registry, _) = registry();
        registry.handle_native_event(&MediaEvent::Playing);
        registry.handle_native_event(&MediaEvent::Pause);

        let snapshot = registry.snapshot();
        assert!(!snapshot.is_playing);
        assert!(snapshot.explicitly_paused);

        registry.handle_native_event(&MediaEvent::Play);
        assert!(!registry.snapshot().explicitly_paused);
    }

    #[test]
    fn test_pause_during_navigation_is_not_explicit() {
        let (registry, _) = registry();
        registry.handle_native_event(&MediaEvent::Playing);
        registry.set_navigation_state(true);

        registry.handle_native_event(&MediaEvent::Pause);

        let snapshot = registry.snapshot();
        assert!(!snapshot.explicitly_paused);
        assert!(snapshot.navigation_in_progress);
        assert!(registry.take_paused_during_navigation());
        assert!(!registry.take_paused_during_navigation());
    }

    #[test]
    fn test_pause_while_interrupted_is_not_explicit() {
        let (registry, _) = registry();
        registry.mark_interrupted();
        registry.handle_native_event(&MediaEvent::Pause);
        assert!(!registry.snapshot().explicitly_paused);

        registry.clear_interruption();
        registry.handle_native_event(&MediaEvent::Pause);
        assert!(registry.snapshot().explicitly_paused);
    }

    #[test]
    fn test_ended_clears_explicit_pause() {
        let (registry, _) = registry();
        registry.update_playback_state(false, true, true);
        assert!(registry.snapshot().explicitly_paused);

        registry.handle_native_event(&MediaEvent::Ended);
        assert!(!registry.snapshot().explicitly_paused);
    }

    #[test]
    fn test_volume_applies_directly_and_clamps() {
        let (registry, backend) = registry();
        let owner = OwnerId::next();
        registry.claim_ownership(owner);
        assert_eq!(registry.set_volume(owner, 1.7), Ok(1.0));

        registry.ensure_initialized();
        assert_eq!(registry.set_volume(owner, -0.2), Ok(0.0));
        assert_eq!(registry.set_volume(owner, f32::NAN), Ok(0.0));
        assert_eq!(registry.set_volume(owner, 0.4), Ok(0.4));

        assert_eq!(
            backend.element().commands(),
            vec![
                ElementCommand::SetVolume(1.0),
                ElementCommand::SetVolume(0.0),
                ElementCommand::SetVolume(0.0),
                ElementCommand::SetVolume(0.4),
            ]
        );
        let commands = backend.element().commands();
        assert!(!commands.contains(&ElementCommand::Load));
    }

    #[test]
    fn test_volume_from_non_owner_is_rejected() {
        let (registry, backend) = registry();
        let owner = OwnerId::next();
        let stale = OwnerId::next();
        registry.ensure_initialized();
        registry.claim_ownership(owner);
        registry.set_volume(owner, 0.7).unwrap();

        assert_eq!(
            registry.set_volume(stale, 0.1),
            Err(RegistryError::NotOwner {
                owner: stale.value(),
                active: Some(owner.value())
            })
        );
        assert!(registry.check_owner(stale).is_err());
        assert!(registry.check_owner(owner).is_ok());
        assert_eq!(registry.snapshot().volume, 0.7);
        let commands = backend.element().commands();
        assert!(!commands.contains(&ElementCommand::SetVolume(0.1)));
    }

    #[test]
    fn test_install_is_once_per_process() {
        let backend = Arc::new(FakeBackend::new());
        let installed = GlobalPlaybackRegistry::install(backend.clone());
        let again = GlobalPlaybackRegistry::install(backend);

        assert!(installed.is_ok());
        assert!(matches!(again, Err(RegistryError::AlreadyInstalled)));
        assert!(GlobalPlaybackRegistry::global().is_some());
    }
}
