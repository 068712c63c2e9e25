//! Error types for Vigil Core
//!
//! Two families live here. [`PlaybackFailure`] is the retryable failure taxonomy
//! of a playback attempt; it never crosses the controller boundary as an `Err`,
//! it ends up in the published view as state plus message. [`Error`] covers the
//! surfaces around the controller: configuration, URL resolution and handle use.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, Error>;

/// Library error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read configuration: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    // Source resolution errors
    #[error("Cannot resolve media source '{source_ref}': {reason}")]
    SourceResolution { source_ref: String, reason: String },

    // Controller errors
    #[error("Playback controller has shut down")]
    ControllerClosed,
}

impl Error {
    /// Returns the error code for diagnostics
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::ConfigIo(_) => "CONFIG_IO",
            Error::ConfigParse(_) => "CONFIG_PARSE",
            Error::SourceResolution { .. } => "SOURCE_RESOLUTION",
            Error::ControllerClosed => "CONTROLLER_CLOSED",
        }
    }
}

/// Why a playback attempt failed
///
/// Every variant is retryable: an occurrence consumes one retry and, while
/// the ceiling is not reached, schedules a fresh attempt after the backoff.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum PlaybackFailure {
    /// Metadata never arrived within the profile's metadata timeout
    #[error("Video metadata did not load in time")]
    MetadataTimeout,

    /// `play()` was refused, usually by an autoplay policy
    #[error("Playback was blocked: {0}")]
    PlayRejected(String),

    /// The element reported a decode or network failure
    #[error("Media error: {0}")]
    MediaError(String),

    /// The element never became ready to begin playback
    #[error("Video was not ready to play in time")]
    ReadinessTimeout,
}

impl PlaybackFailure {
    /// Returns the failure code for diagnostics
    pub fn code(&self) -> &'static str {
        match self {
            PlaybackFailure::MetadataTimeout => "METADATA_TIMEOUT",
            PlaybackFailure::PlayRejected(_) => "PLAY_REJECTED",
            PlaybackFailure::MediaError(_) => "MEDIA_ERROR",
            PlaybackFailure::ReadinessTimeout => "READINESS_TIMEOUT",
        }
    }

    /// All playback failures are retryable up to the retry ceiling
    pub fn is_retryable(&self) -> bool {
        true
    }
}
