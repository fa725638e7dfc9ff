//! Shared error types for the services crate.

use thiserror::Error;

use progress_core::{MappingError, ValidationError};
use resources::ResourceError;

/// Errors emitted by the tracker, content session coordinator and mastery manager.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoggingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ResourceError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("no content session log is active")]
    NoSessionLog,
    #[error("no mastery log is active")]
    NoMasteryLog,
    #[error("no attempt log is active")]
    NoAttemptLog,
    #[error("{0} has not been assigned an id yet")]
    NotPersisted(&'static str),
    #[error("progress tracking is already running")]
    AlreadyTracking,
    #[error("progress tracking is not running")]
    NotTracking,
    #[error("no async runtime available to flush logs")]
    NoRuntime,
    #[error("log flush task failed: {0}")]
    FlushTask(String),
}

/// Errors emitted by `SessionController`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("username or password was not accepted")]
    BadCredentials,
    #[error("session has no facility")]
    NoFacility,
    #[error(transparent)]
    Api(#[from] ResourceError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
}

/// Errors raised by cookie jars.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CookieError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Format(#[from] serde_json::Error),
}

/// Errors emitted by `ChannelService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChannelError {
    #[error(transparent)]
    Api(#[from] ResourceError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Cookie(#[from] CookieError),
}

/// Invalid tracker configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}
