//! Error types for the monitoring engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during filesystem monitoring.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Native file watching error.
    #[error("File watching error: {0}")]
    Watch(String),

    /// Registration could not be established; no registration materializes.
    #[error("Registration failed for '{}': {reason}", path.display())]
    Registration {
        /// Root path the registration was attempted for.
        path: PathBuf,
        /// Why resource acquisition or the initial scan failed.
        reason: String,
    },

    /// The watched root directory is gone or no longer resolvable.
    #[error("Watched root '{}' is no longer accessible", .0.display())]
    RootLost(PathBuf),

    /// Recovery retries were exhausted without a successful rescan.
    #[error("Recovery retry budget exhausted after {attempts} attempts")]
    RetryBudgetExhausted {
        /// Number of retries performed before giving up.
        attempts: u32,
    },

    /// Monitor is not running.
    #[error("Monitor is not running")]
    NotRunning,

    /// Monitor is already running.
    #[error("Monitor is already running")]
    AlreadyRunning,

    /// Monitor has been stopped and cannot be restarted.
    #[error("Monitor has been stopped")]
    Stopped,

    /// Invalid path.
    #[error("Invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// Pattern matching error.
    #[error("Pattern error: {0}")]
    Pattern(String),

    /// Channel error.
    #[error("Channel error: {0}")]
    Channel(String),
}

/// Result type for monitoring operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error maps to a vanished filesystem entry.
    pub(crate) fn is_not_found(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Convert notify errors to our error type.
impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Watch(err.to_string())
    }
}

/// Convert flume send errors to our error type.
impl<T> From<flume::SendError<T>> for Error {
    fn from(err: flume::SendError<T>) -> Self {
        Error::Channel(format!("Channel send error: {}", err))
    }
}

/// Convert globset errors to our error type.
impl From<globset::Error> for Error {
    fn from(err: globset::Error) -> Self {
        Error::Pattern(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_failures_map_to_channel_errors() {
        let (tx, rx) = flume::unbounded::<u8>();
        drop(rx);
        let err: Error = tx.send(1).unwrap_err().into();
        assert!(matches!(err, Error::Channel(_)));
    }

    #[test]
    fn not_found_ios_are_recognized() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(err.is_not_found());
        let err: Error = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(!err.is_not_found());
    }
}
