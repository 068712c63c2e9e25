//! Presentation overlay derived from the playback view
//!
//! The shell only reads the view and calls `retry()`; it never touches the
//! session itself.

use crate::types::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the shell draws over a media slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "overlay", rename_all = "snake_case")]
pub enum Overlay {
    /// Loading indicator, annotated while retrying
    Spinner { retrying: Option<(u32, u32)> },
    /// Video is playing, nothing on top
    None,
    /// Terminal failure with a manual retry action
    ErrorPanel { message: String, can_retry: bool },
}

impl Overlay {
    /// Derive the overlay for `view`
    pub fn for_view(view: &PlaybackView) -> Self {
        match view.state {
            PlaybackState::Loading | PlaybackState::Ready => Overlay::Spinner {
                retrying: (view.retry_count > 0).then_some((view.retry_count, view.max_retries)),
            },
            PlaybackState::Playing => Overlay::None,
            PlaybackState::Error => Overlay::ErrorPanel {
                message: view
                    .last_error_message
                    .clone()
                    .unwrap_or_else(|| "Playback failed".to_string()),
                can_retry: view.can_retry(),
            },
        }
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self, Overlay::None)
    }
}

impl fmt::Display for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Overlay::Spinner { retrying: None } => write!(f, "loading"),
            Overlay::Spinner {
                retrying: Some((n, max)),
            } => write!(f, "loading (retrying {}/{})", n, max),
            Overlay::None => write!(f, "-"),
            Overlay::ErrorPanel { message, .. } => write!(f, "error: {} [retry]", message),
        }
    }
}
