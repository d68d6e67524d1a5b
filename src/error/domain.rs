//! Domain-specific error types using `thiserror`.
//!
//! This module defines the error enums for the playback engine: command
//! misuse, registry ownership violations, and the umbrella `EngineError`
//! returned by setup paths.

use std::{io::Error as IoError, result::Result as StdResult};

use thiserror::Error;

use crate::config::SettingsError;

/// Errors returned by the command surface.
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// The playlist has no targets.
    #[error("Playlist is empty")]
    EmptyPlaylist,
    /// Requested index is outside the playlist.
    #[error("Index {index} out of range for playlist of {len}")]
    IndexOutOfRange { index: usize, len: usize },
    /// Registry refused the command.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
    /// Invalid operation for current state.
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },
}

/// Errors raised by the global playback registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No element has been created yet.
    #[error("Audio element not initialized")]
    NotInitialized,
    /// The caller is not the active owner.
    #[error("Owner {owner} is not the active owner (active: {active:?})")]
    NotOwner { owner: u64, active: Option<u64> },
    /// A process-wide registry was already installed.
    #[error("A process-wide registry is already installed")]
    AlreadyInstalled,
}

/// Umbrella error for engine setup and configuration.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Playback command error.
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),
    /// Settings load or save error.
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    /// Engine thread could not be started.
    #[error("Failed to spawn engine thread: {0}")]
    Spawn(#[from] IoError),
    /// Engine thread is gone.
    #[error("Engine is shut down")]
    ShutDown,
}

/// Result alias for engine setup paths.
pub type Result<T> = StdResult<T, EngineError>;

#[cfg(test)]
mod tests {
    use crate::{
        config::SettingsError,
        error::domain::{EngineError, PlaybackError, RegistryError},
    };

    #[test]
    fn test_playback_error_display() {
        assert_eq!(PlaybackError::EmptyPlaylist.to_string(), "Playlist is empty");

        let out_of_range = PlaybackError::IndexOutOfRange { index: 4, len: 2 };
        assert_eq!(
            out_of_range.to_string(),
            "Index 4 out of range for playlist of 2"
        );

        let invalid_op_error = PlaybackError::InvalidOperation {
            reason: "test reason".to_string(),
        };
        assert_eq!(
            invalid_op_error.to_string(),
            "Invalid operation: test reason"
        );
    }

    #[test]
    fn test_registry_error_wraps_into_playback_error() {
        let error: PlaybackError = RegistryError::NotOwner {
            owner: 3,
            active: Some(7),
        }
        .into();
        assert_eq!(
            error.to_string(),
            "Registry error: Owner 3 is not the active owner (active: Some(7))"
        );
    }

    #[test]
    fn test_engine_error_display() {
        let error: EngineError = PlaybackError::EmptyPlaylist.into();
        assert_eq!(error.to_string(), "Playback error: Playlist is empty");
        assert_eq!(EngineError::ShutDown.to_string(), "Engine is shut down");

        let error: EngineError = SettingsError::InvalidValue {
            reason: "zero delay".to_string(),
        }
        .into();
        assert!(matches!(error, EngineError::Settings(_)));
    }
}
