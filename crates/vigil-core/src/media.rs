//! Media element abstraction
//!
//! The controller never touches a concrete player. It drives anything that
//! implements [`MediaElement`]: an embedded browser's video element behind a
//! bridge, a native pipeline, or the scriptable simulator used in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::PreloadStrategy;

/// Events a media element reports to its listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum MediaEvent {
    /// Duration and dimensions are known
    LoadedMetadata,
    /// Enough data to begin playback
    CanPlay,
    /// Playback started or resumed
    Playing,
    /// Current playback position moved (seconds)
    TimeUpdate(f64),
    /// Playback paused
    Pause,
    /// Fetching stalled
    Stalled,
    /// Decode or network failure
    Error(String),
}

impl MediaEvent {
    /// Event name as a browser would report it
    pub fn name(&self) -> &'static str {
        match self {
            MediaEvent::LoadedMetadata => "loadedmetadata",
            MediaEvent::CanPlay => "canplay",
            MediaEvent::Playing => "playing",
            MediaEvent::TimeUpdate(_) => "timeupdate",
            MediaEvent::Pause => "pause",
            MediaEvent::Stalled => "stalled",
            MediaEvent::Error(_) => "error",
        }
    }
}

/// Compatibility attributes applied before a source is assigned
///
/// Several embedded browsers snapshot these at load time and ignore later
/// mutation, so they are always set first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttributes {
    pub muted: bool,
    pub looping: bool,
    pub autoplay: bool,
    /// Also covers `webkit-playsinline` and `x5-playsinline`
    pub plays_inline: bool,
    pub preload: PreloadStrategy,
    /// `crossorigin` attribute value
    pub cross_origin: Option<String>,
}

impl MediaAttributes {
    /// Attributes for unattended, muted, looping signage video
    pub fn signage(preload: PreloadStrategy) -> Self {
        Self {
            muted: true,
            looping: true,
            autoplay: true,
            plays_inline: true,
            preload,
            cross_origin: Some("anonymous".into()),
        }
    }
}

/// Identifier of a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

/// Event callback
pub type Listener = Box<dyn Fn(MediaEvent) + Send + Sync>;

/// A host media element
///
/// Implementations use interior mutability; all methods take `&self` so a
/// single element can be shared between the controller task and the tasks
/// awaiting `play()`.
#[async_trait]
pub trait MediaElement: Send + Sync {
    /// Apply compatibility attributes
    fn apply_attributes(&self, attributes: &MediaAttributes);

    /// Assign the media source
    fn set_source(&self, url: &str);

    /// Remove the media source and release the resource
    fn clear_source(&self);

    /// Begin (or restart) fetching the assigned source
    fn load(&self);

    /// Request playback; settles once the element starts or refuses
    async fn play(&self) -> std::result::Result<(), String>;

    /// Pause playback
    fn pause(&self);

    /// Whether the element is paused
    fn is_paused(&self) -> bool;

    /// Seconds of media buffered ahead of the current position
    fn buffered_ahead(&self) -> f64;

    /// Register an event listener
    fn add_listener(&self, listener: Listener) -> ListenerId;

    /// Remove a previously registered listener
    fn remove_listener(&self, id: ListenerId);
}

/// Listener registration that detaches itself when dropped
pub struct ListenerGuard {
    element: Arc<dyn MediaElement>,
    id: ListenerId,
}

impl ListenerGuard {
    /// Register `listener` on `element`
    pub fn attach(element: Arc<dyn MediaElement>, listener: Listener) -> Self {
        let id = element.add_listener(listener);
        Self { element, id }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.element.remove_listener(self.id);
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard").field("id", &self.id).finish()
    }
}
