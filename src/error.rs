//! Error handling module for mc-manager.
//!
//! This module defines the error types used throughout the library.
//! Most failures are recovered at component boundaries and turned into
//! an [`ActionOutcome`](crate::action::ActionOutcome) with a
//! human-readable reason; the variants here carry the context needed to
//! do that consistently.

use thiserror::Error;

/// Errors that can occur in the mc-manager library.
#[derive(Error, Debug)]
pub enum Error {
    /// A server id or version identifier was not known.
    ///
    /// This error occurs when:
    /// - An id is used that doesn't match any registered server
    /// - A version string is not present in the version catalog
    #[error("Not found: {0}")]
    NotFound(String),

    /// An operation was issued against a server in the wrong state.
    ///
    /// This error occurs when:
    /// - `start` is called on a server that is already running
    /// - `stop` is called on a server that is not running or already stopping
    /// - A player command is issued while the server is not running
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Installation of a server instance failed.
    ///
    /// This error occurs when:
    /// - The requested version cannot be resolved to a download
    /// - The artifact download or a filesystem write fails
    /// - A spigot/craftbukkit build step fails
    #[error("Install failed: {0}")]
    Install(String),

    /// The OS refused to launch a server process.
    ///
    /// This error occurs when:
    /// - The java executable is missing or not permitted
    /// - The working directory does not exist
    #[error("Spawn failed: {0}")]
    Spawn(String),

    /// An action payload was malformed.
    ///
    /// This error occurs when:
    /// - The action kind is unknown
    /// - A player verb is missing its target field
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The version catalog could not be queried or populated.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Error communicating with or bookkeeping a live server process.
    ///
    /// This error occurs when:
    /// - A stdin write to the process fails
    /// - A process pipe cannot be taken after spawn
    #[error("Server process error: {0}")]
    Process(String),

    /// Failed to parse or validate configuration.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Filesystem or network I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Error in serializing or deserializing data.
    ///
    /// This error occurs when:
    /// - The registry snapshot cannot be written or read back
    /// - A roster file (`banned-players.json`, `ops.json`) is malformed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for mc-manager operations.
pub type Result<T> = std::result::Result<T, Error>;
