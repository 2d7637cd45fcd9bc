//! Logging errors.

use thiserror::Error;

/// Errors raised while installing a subscriber.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LogError {
    /// The filter directive did not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),

    /// The configuration is unusable.
    #[error("invalid log configuration: {0}")]
    Config(String),

    /// A global subscriber was already set.
    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(String),
}

/// Result alias for logging setup.
pub type LogResult<T> = Result<T, LogError>;
