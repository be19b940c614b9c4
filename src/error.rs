//! Centralized error types for docharvest.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::message::MessageId;

/// All errors produced by the docharvest library.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A required setting is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A credential expected in the environment is absent or blank.
    #[error("Missing required credential: environment variable {0} is not set")]
    MissingCredential(String),

    /// The feed could not be opened, reached, or iterated.
    #[error("Feed error: {0}")]
    Feed(String),

    /// A single message payload could not be fetched.
    #[error("Failed to fetch payload of message {id}: {reason}")]
    Fetch { id: MessageId, reason: String },

    /// The durable download state could not be loaded or persisted.
    #[error("Download state error for '{path}': {reason}")]
    State { path: PathBuf, reason: String },

    /// A document could not be read while computing its fingerprint.
    #[error("Cannot fingerprint '{path}': {source}")]
    Fingerprint {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A manifest could not be serialized or parsed.
    #[error("Manifest error: {0}")]
    Manifest(String),
}

/// Convenience alias for `Result<T, HarvestError>`.
pub type Result<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `State` variant from a path and any displayable reason.
    pub fn state(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::State {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `HarvestError::io`).
impl From<std::io::Error> for HarvestError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
