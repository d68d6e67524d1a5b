//! Preference persistence collaborator.
//!
//! The orchestrator reads and writes two primitive preferences, volume and
//! random mode, synchronously. A store that has nothing saved returns `None`
//! and the caller falls back to its defaults; a store that cannot persist
//! logs and carries on.

use std::sync::Arc;

use crate::{
    config::settings::SettingsManager,
    error::{ErrorReporter, ResultExt},
};

/// Synchronous get/set of playback preferences.
pub trait PreferenceStore: Send {
    /// Saved volume, if any.
    fn volume(&self) -> Option<f32>;

    /// Saves the volume.
    fn set_volume(&mut self, volume: f32);

    /// Saved random-mode flag, if any.
    fn random_mode(&self) -> Option<bool>;

    /// Saves the random-mode flag.
    fn set_random_mode(&mut self, enabled: bool);
}

/// Store that keeps preferences for the life of the process only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InMemoryPreferences {
    volume: Option<f32>,
    random_mode: Option<bool>,
}

impl PreferenceStore for InMemoryPreferences {
    fn volume(&self) -> Option<f32> {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = Some(volume);
    }

    fn random_mode(&self) -> Option<bool> {
        self.random_mode
    }

    fn set_random_mode(&mut self, enabled: bool) {
        self.random_mode = Some(enabled);
    }
}

impl PreferenceStore for Arc<SettingsManager> {
    fn volume(&self) -> Option<f32> {
        Some(self.get_settings().volume)
    }

    fn set_volume(&mut self, volume: f32) {
        if let Err(e) = self
            .modify(|settings| settings.volume = volume)
            .add_context("Failed to persist volume")
        {
            ErrorReporter::warn(&e, "preferences");
        }
    }

    fn random_mode(&self) -> Option<bool> {
        Some(self.get_settings().random_mode)
    }

    fn set_random_mode(&mut self, enabled: bool) {
        if let Err(e) = self
            .modify(|settings| settings.random_mode = enabled)
            .add_context("Failed to persist random mode")
        {
            ErrorReporter::warn(&e, "preferences");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use crate::config::{
        preferences::{InMemoryPreferences, PreferenceStore},
        settings::SettingsManager,
    };

    #[test]
    fn test_in_memory_store_starts_empty() {
        let mut store = InMemoryPreferences::default();
        assert_eq!(store.volume(), None);
        assert_eq!(store.random_mode(), None);

        store.set_volume(0.5);
        store.set_random_mode(true);
        assert_eq!(store.volume(), Some(0.5));
        assert_eq!(store.random_mode(), Some(true));
    }

    #[test]
    fn test_settings_manager_store_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");

        let mut store = Arc::new(SettingsManager::with_config_path(path.clone()).unwrap());
        store.set_volume(0.3);
        store.set_random_mode(true);

        let reopened = SettingsManager::with_config_path(path).unwrap();
        assert_eq!(reopened.get_settings().volume, 0.3);
        assert!(reopened.get_settings().random_mode);
    }
}
