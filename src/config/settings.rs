//! Engine settings with XDG Base Directory compliance.
//!
//! Volume, random mode and every recovery tunable live in one JSON file under
//! the XDG config directory. Missing files and missing fields fall back to
//! defaults.

use std::{
    env::var,
    fs::{create_dir_all, read_to_string, write},
    io::Error as StdError,
    path::PathBuf,
    time::Duration,
};

use {
    parking_lot::{RwLock, RwLockReadGuard},
    serde::{Deserialize, Serialize},
    serde_json::{Error as SerdeJsonError, from_str, to_string_pretty},
    thiserror::Error,
    tracing::{debug, warn},
};

use crate::playback::{adaptive::AdaptiveConfig, retry::RetryHandler};

/// Error type for settings operations.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read or write settings file.
    #[error("IO error: {0}")]
    IoError(#[from] StdError),
    /// Failed to serialize or deserialize settings.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] SerdeJsonError),
    /// Invalid settings value.
    #[error("Invalid settings value: {reason}")]
    InvalidValue { reason: String },
}

/// Retry budgets, backoff and watchdog windows.
///
/// Every backoff delay in the engine comes from a [`RetryHandler`] built here
/// and shares the single `max_backoff_ms` cap. The load-timeout window is a
/// separate quantity (how long to wait for readiness) with its own cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryPolicy {
    /// Load retries before a stream is declared failed.
    pub load_max_retries: u32,
    /// First load retry delay in milliseconds.
    pub load_base_delay_ms: u64,
    /// Play-request retries before giving up.
    pub play_max_retries: u32,
    /// First play retry delay in milliseconds.
    pub play_base_delay_ms: u64,
    /// Cap for every backoff delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Base readiness window per load attempt, in milliseconds.
    pub load_timeout_base_ms: u64,
    /// Upper bound of the readiness window, in milliseconds.
    pub load_timeout_cap_ms: u64,
    /// Length of the navigation grace window, in milliseconds.
    pub navigation_grace_ms: u64,
    /// Adaptive client tuning.
    pub adaptive: AdaptiveConfig,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            load_max_retries: 3,
            load_base_delay_ms: 1000,
            play_max_retries: 3,
            play_base_delay_ms: 1000,
            max_backoff_ms: 16_000,
            load_timeout_base_ms: 20_000,
            load_timeout_cap_ms: 30_000,
            navigation_grace_ms: 1000,
            adaptive: AdaptiveConfig::default(),
        }
    }
}

impl RecoveryPolicy {
    /// Fresh handler for load-level recovery.
    #[must_use]
    pub fn load_retry(&self) -> RetryHandler {
        RetryHandler::new(
            self.load_max_retries,
            Duration::from_millis(self.load_base_delay_ms),
        )
        .with_max_delay(Duration::from_millis(self.max_backoff_ms))
    }

    /// Fresh handler for play-request recovery.
    #[must_use]
    pub fn play_retry(&self) -> RetryHandler {
        RetryHandler::new(
            self.play_max_retries,
            Duration::from_millis(self.play_base_delay_ms),
        )
        .with_max_delay(Duration::from_millis(self.max_backoff_ms))
    }

    /// Readiness window for a load attempt: base plus the pending backoff, capped.
    ///
    /// # Arguments
    ///
    /// * `backoff` - The load handler's current delay.
    #[must_use]
    pub fn load_timeout(&self, backoff: Duration) -> Duration {
        (Duration::from_millis(self.load_timeout_base_ms) + backoff)
            .min(Duration::from_millis(self.load_timeout_cap_ms))
    }

    /// Navigation grace window.
    #[must_use]
    pub fn navigation_grace(&self) -> Duration {
        Duration::from_millis(self.navigation_grace_ms)
    }

    /// Checks the values for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidValue` when a delay or cap is zero, or
    /// the load-timeout cap is below its base.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.load_base_delay_ms == 0 || self.play_base_delay_ms == 0 {
            return Err(SettingsError::InvalidValue {
                reason: "retry base delays must be positive".to_string(),
            });
        }
        if self.max_backoff_ms < self.load_base_delay_ms.max(self.play_base_delay_ms) {
            return Err(SettingsError::InvalidValue {
                reason: "max_backoff_ms is below a base delay".to_string(),
            });
        }
        if self.load_timeout_cap_ms < self.load_timeout_base_ms {
            return Err(SettingsError::InvalidValue {
                reason: "load_timeout_cap_ms is below load_timeout_base_ms".to_string(),
            });
        }
        Ok(())
    }
}

/// Serializable user settings structure with default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// Output volume in `0.0..=1.0`.
    pub volume: f32,
    /// Whether `next` picks a random station.
    pub random_mode: bool,
    /// Recovery tunables.
    pub recovery: RecoveryPolicy,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            random_mode: false,
            recovery: RecoveryPolicy::default(),
        }
    }
}

/// Handles loading, saving, and validation of user preferences.
#[derive(Debug)]
pub struct SettingsManager {
    /// Thread-safe user settings storage.
    settings: RwLock<UserSettings>,
    /// Path to the configuration file on disk.
    config_path: PathBuf,
}

impl SettingsManager {
    /// Creates a new settings manager with default config path.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if settings cannot be loaded from disk.
    pub fn new() -> Result<Self, SettingsError> {
        Self::with_config_path(get_config_path())
    }

    /// Creates a new settings manager with a custom config path.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Custom path for the settings file
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the directory cannot be created or an
    /// existing file cannot be parsed.
    pub fn with_config_path(config_path: PathBuf) -> Result<Self, SettingsError> {
        if let Some(parent) = config_path.parent() {
            create_dir_all(parent)?;
        }

        let settings = if config_path.exists() {
            debug!("Loading settings from existing file: {:?}", config_path);
            let contents = read_to_string(&config_path)?;
            from_str(&contents)?
        } else {
            debug!("Using default settings, no file at {:?}", config_path);
            UserSettings::default()
        };

        Ok(SettingsManager {
            settings: RwLock::new(settings),
            config_path,
        })
    }

    /// Opens the settings at `config_path`, falling back to defaults on any error.
    ///
    /// The fallback manager still writes to `config_path`, so the next
    /// successful save repairs a corrupt file.
    #[must_use]
    pub fn open_or_default(config_path: PathBuf) -> Self {
        match Self::with_config_path(config_path.clone()) {
            Ok(manager) => manager,
            Err(e) => {
                warn!("Settings unreadable at {:?}, using defaults: {e}", config_path);
                SettingsManager {
                    settings: RwLock::new(UserSettings::default()),
                    config_path,
                }
            }
        }
    }

    /// Gets the current settings.
    pub fn get_settings(&self) -> RwLockReadGuard<'_, UserSettings> {
        self.settings.read()
    }

    /// Gets the configuration file path.
    pub fn get_config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Updates the settings and saves them to disk.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if the recovery policy is inconsistent or the
    /// file cannot be written.
    pub fn update_settings(&self, new_settings: UserSettings) -> Result<(), SettingsError> {
        new_settings.recovery.validate()?;
        *self.settings.write() = new_settings;
        self.save_settings()
    }

    /// Applies `change` to a copy of the settings and saves it.
    ///
    /// # Errors
    ///
    /// Same as [`SettingsManager::update_settings`].
    pub fn modify(&self, change: impl FnOnce(&mut UserSettings)) -> Result<(), SettingsError> {
        let mut settings = self.settings.read().clone();
        change(&mut settings);
        self.update_settings(settings)
    }

    fn save_settings(&self) -> Result<(), SettingsError> {
        debug!("Saving settings to file: {:?}", self.config_path);
        let contents = to_string_pretty(&*self.settings.read())?;
        write(&self.config_path, contents)?;
        Ok(())
    }
}

/// Path of the settings file.
#[must_use]
pub fn get_config_path() -> PathBuf {
    let mut config_dir = get_xdg_config_home();
    config_dir.push("oxstream");
    config_dir.push("settings.json");
    config_dir
}

/// Uses `XDG_CONFIG_HOME` if set, otherwise `$HOME/.config`.
fn get_xdg_config_home() -> PathBuf {
    if let Ok(config_home) = var("XDG_CONFIG_HOME")
        && !config_home.is_empty()
    {
        return PathBuf::from(config_home);
    }

    if let Ok(home) = var("HOME") {
        let mut path = PathBuf::from(home);
        path.push(".config");
        return path;
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use std::{fs::write, time::Duration};

    use {
        serde_json::{from_str, to_string},
        tempfile::TempDir,
    };

    use crate::config::settings::{RecoveryPolicy, SettingsError, SettingsManager, UserSettings};

    #[test]
    fn test_user_settings_default() {
        let settings = UserSettings::default();
        assert_eq!(settings.volume, 1.0);
        assert!(!settings.random_mode);
        assert_eq!(settings.recovery.load_max_retries, 3);
        assert_eq!(settings.recovery.max_backoff_ms, 16_000);
        assert_eq!(settings.recovery.adaptive.live_sync_duration_count, 3);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let settings: UserSettings =
            from_str(r#"{"volume":0.4,"recovery":{"load_max_retries":5}}"#).unwrap();

        assert_eq!(settings.volume, 0.4);
        assert_eq!(settings.recovery.load_max_retries, 5);
        assert_eq!(settings.recovery.load_base_delay_ms, 1000);
        assert!(!settings.random_mode);
    }

    #[test]
    fn test_user_settings_serialization() {
        let mut settings = UserSettings::default();
        settings.random_mode = true;
        settings.recovery.navigation_grace_ms = 250;

        let serialized = to_string(&settings).unwrap();
        let deserialized: UserSettings = from_str(&serialized).unwrap();
        assert_eq!(settings, deserialized);
    }

    #[test]
    fn test_load_timeout_window_is_capped() {
        let policy = RecoveryPolicy::default();
        assert_eq!(
            policy.load_timeout(Duration::from_millis(1000)),
            Duration::from_millis(21_000)
        );
        assert_eq!(
            policy.load_timeout(Duration::from_millis(16_000)),
            Duration::from_millis(30_000)
        );
    }

    #[test]
    fn test_policy_builds_capped_handlers() {
        let mut policy = RecoveryPolicy::default();
        policy.max_backoff_ms = 3000;

        let mut retry = policy.load_retry();
        retry.increment_retry();
        retry.increment_retry();
        assert_eq!(retry.get_delay(), Duration::from_millis(3000));
        assert_eq!(policy.play_retry().get_retry_count(), 0);
    }

    #[test]
    fn test_validate_rejects_inverted_timeout_window() {
        let mut policy = RecoveryPolicy::default();
        policy.load_timeout_cap_ms = 10_000;

        let error = policy.validate().unwrap_err();
        assert!(matches!(error, SettingsError::InvalidValue { .. }));
    }

    #[test]
    fn test_manager_persists_changes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("settings.json");

        let manager = SettingsManager::with_config_path(path.clone()).unwrap();
        manager.modify(|settings| settings.volume = 0.25).unwrap();

        let reopened = SettingsManager::with_config_path(path).unwrap();
        assert_eq!(reopened.get_settings().volume, 0.25);
    }

    #[test]
    fn test_open_or_default_tolerates_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        write(&path, "{ not json").unwrap();

        assert!(SettingsManager::with_config_path(path.clone()).is_err());

        let manager = SettingsManager::open_or_default(path.clone());
        assert_eq!(*manager.get_settings(), UserSettings::default());
        assert_eq!(manager.get_config_path(), &path);
    }
}
