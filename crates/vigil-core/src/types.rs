//! Core types for Vigil

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a controller session (one per media slot)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Attempt generation stamp
///
/// Bumped on every (re)initialization of a playback attempt. Anything
/// stamped with an older generation belongs to an abandoned attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    /// The generation that follows this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse device classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    /// Desktop or mobile browser with a user nearby
    Interactive,
    /// Embedded browser on a television-class panel
    TvClass,
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Interactive => write!(f, "interactive"),
            DeviceClass::TvClass => write!(f, "tv"),
        }
    }
}

/// How much of the media the element should fetch ahead of playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreloadStrategy {
    MetadataOnly,
    Full,
}

impl PreloadStrategy {
    /// Value of the `preload` attribute
    pub fn attribute_value(&self) -> &'static str {
        match self {
            PreloadStrategy::MetadataOnly => "metadata",
            PreloadStrategy::Full => "auto",
        }
    }
}

/// Playback state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Attributes applied, source assigned, waiting for metadata
    Loading,
    /// Metadata known, waiting to begin playback
    Ready,
    /// Playing (or about to advance past time 0)
    Playing,
    /// Retries exhausted; only a manual retry leaves this state
    Error,
}

impl PlaybackState {
    /// Check if transition to target state is valid
    pub fn can_transition_to(&self, target: PlaybackState) -> bool {
        use PlaybackState::*;
        matches!(
            (self, target),
            // Fresh attempts (retry, source change) restart from Loading
            (Loading, Loading) | (Loading, Ready) | (Loading, Error) |
            (Ready, Loading) | (Ready, Playing) | (Ready, Error) |
            // Source change while playing
            (Playing, Loading) |
            // Manual retry or source change
            (Error, Loading)
        )
    }

    /// True while an attempt is in flight
    pub fn is_pending(&self) -> bool {
        matches!(self, PlaybackState::Loading | PlaybackState::Ready)
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Loading => write!(f, "loading"),
            PlaybackState::Ready => write!(f, "ready"),
            PlaybackState::Playing => write!(f, "playing"),
            PlaybackState::Error => write!(f, "error"),
        }
    }
}

/// Read-only view of a playback session, published to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackView {
    pub state: PlaybackState,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Set only in [`PlaybackState::Error`]
    pub last_error_message: Option<String>,
    pub generation: Generation,
    pub device_class: DeviceClass,
}

impl PlaybackView {
    /// True when a manual retry would be accepted
    pub fn can_retry(&self) -> bool {
        self.state == PlaybackState::Error
    }
}
