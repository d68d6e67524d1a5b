//! Engine settings and preference persistence.
//!
//! This module provides the JSON settings file (XDG compliant) and the
//! preference store collaborator the orchestrator reads volume and random
//! mode from.

pub mod preferences;
pub mod settings;

pub use {
    preferences::{InMemoryPreferences, PreferenceStore},
    settings::{RecoveryPolicy, SettingsError, SettingsManager, UserSettings, get_config_path},
};
