//! Operational error context propagation with `anyhow`.
//!
//! Extension traits for attaching context to fallible collaborator calls
//! (settings persistence, host callbacks) and a reporter that routes the
//! result to `tracing` at the right level.

use std::{error::Error as StdError, fmt::Display};

use {
    anyhow::{Context, Error, Result as AnyhowResult},
    tracing::{debug, error, warn},
};

use crate::state::PlaybackFailure;

/// Extension trait for enhanced error context.
pub trait ResultExt<T, E> {
    /// Adds context to an error with a static string.
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;

    /// Adds context to an error with a formatted string.
    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn add_context(self, context: &'static str) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(context)
    }

    fn add_contextf(self, format: impl Display) -> AnyhowResult<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.context(format.to_string())
    }
}

/// Centralized error reporting.
pub struct ErrorReporter;

impl ErrorReporter {
    /// Reports a diagnostic that needs no attention.
    pub fn debug(error: &Error, context: &str) {
        debug!(context = context, error = %error, "Ignored error");
    }

    /// Reports a recoverable problem, e.g. a preference that failed to persist.
    pub fn warn(error: &Error, context: &str) {
        warn!(context = context, error = format!("{error:#}"), "Recoverable error");
    }

    /// Reports a problem the engine cannot work around.
    pub fn error(error: &Error, context: &str) {
        error!(context = context, error = format!("{error:#}"), "Unrecoverable error");
    }

    /// Reports a terminal stream failure.
    pub fn failure(failure: &PlaybackFailure) {
        error!(
            url = %failure.url,
            kind = ?failure.kind,
            "Playback stopped: {}",
            failure.message
        );
    }

    /// Formats an error chain as a single line for display.
    #[must_use]
    pub fn to_user_message(error: &Error) -> String {
        error
            .chain()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(": ")
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Error as IoError, ErrorKind::PermissionDenied};

    use anyhow::anyhow;

    use crate::error::operational::{ErrorReporter, ResultExt};

    #[test]
    fn test_result_ext_with_context() {
        let result: Result<(), IoError> = Err(IoError::new(PermissionDenied, "read-only"));
        let error = result.add_context("Failed to persist volume").unwrap_err();

        assert_eq!(error.to_string(), "Failed to persist volume");
        assert_eq!(
            ErrorReporter::to_user_message(&error),
            "Failed to persist volume: read-only"
        );
    }

    #[test]
    fn test_result_ext_with_contextf() {
        let result: Result<(), IoError> = Err(IoError::new(PermissionDenied, "denied"));
        let error = result.add_contextf(format!("Saving {}", "settings.json")).unwrap_err();

        assert!(error.to_string().contains("Saving settings.json"));
    }

    #[test]
    fn test_error_reporter_user_message_single() {
        let error = anyhow!("Test error message");
        assert_eq!(ErrorReporter::to_user_message(&error), "Test error message");
    }
}
