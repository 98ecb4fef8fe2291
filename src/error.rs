//! Error types for threadkeep
//!
//! This module defines the error taxonomy of the session store, using
//! `thiserror` for the enum and `anyhow` for propagation.

use thiserror::Error;

/// Main error type for threadkeep operations
///
/// "No such session" outcomes are not represented here: store operations
/// report them as `Ok(false)` or `Ok(None)` so callers can branch without
/// error plumbing. `NotFound` is for callers that want to turn such an
/// outcome into an error.
#[derive(Error, Debug)]
pub enum ThreadkeepError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A storage backend failed its connectivity probe
    ///
    /// Raised at construction time only. The backend factory consumes it to
    /// fall back to the next variant.
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The requested session does not exist
    #[error("Session not found: {0}")]
    NotFound(String),

    /// The active backend lacks the requested capability
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Session id generation never found a free slot
    #[error("Could not generate a unique session id after {attempts} attempts")]
    UniquenessExhausted {
        /// Number of candidates tried
        attempts: usize,
    },

    /// Backend I/O fault (disk, database, record encoding)
    #[error("Storage fault: {0}")]
    StorageFault(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for threadkeep operations
///
/// Uses `anyhow::Error` so context can be attached on the way up; the typed
/// variant is recovered with `downcast_ref::<ThreadkeepError>()`.
pub type Result<T> = anyhow::Result<T>;

/// Returns the typed error behind an `anyhow::Error`, if any
pub fn kind_of(err: &anyhow::Error) -> Option<&ThreadkeepError> {
    err.downcast_ref::<ThreadkeepError>()
}
