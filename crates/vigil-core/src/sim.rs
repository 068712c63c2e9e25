//! Scriptable media element
//!
//! A deterministic stand-in for a host video element. Each `load()` consumes
//! the next [`AttemptScript`], which lists the events the element reports for
//! that load and how `play()` settles. Once the scripts run out the fallback
//! script is used for every further load.
//!
//! Events scheduled by a load are delivered to the listeners that were
//! attached when `load()` was called, even if those listeners have since been
//! removed. This models events already dispatched by the host before a
//! listener was detached, which is exactly the case generation stamps guard
//! against.

use crate::media::{Listener, ListenerId, MediaAttributes, MediaElement, MediaEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// How `play()` settles during one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlayScript {
    /// Resolve after `after_ms`
    Resolve { after_ms: u64 },
    /// Reject with `reason` after `after_ms`
    Reject { after_ms: u64, reason: String },
    /// Never settle
    Hang,
}

/// Behaviour of the element for one `load()`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptScript {
    /// Events reported after `load()`, with their offset in milliseconds
    #[serde(default)]
    pub events: Vec<(u64, MediaEvent)>,
    /// How `play()` settles
    pub play: PlayScript,
}

impl AttemptScript {
    /// Metadata, readiness and a prompt successful `play()`
    pub fn healthy() -> Self {
        Self {
            events: vec![(200, MediaEvent::LoadedMetadata), (400, MediaEvent::CanPlay)],
            play: PlayScript::Resolve { after_ms: 50 },
        }
    }

    /// Metadata and readiness, then `play()` is refused
    pub fn play_rejected(reason: impl Into<String>) -> Self {
        Self {
            play: PlayScript::Reject {
                after_ms: 50,
                reason: reason.into(),
            },
            ..Self::healthy()
        }
    }

    /// The element reports an error shortly after `load()`
    pub fn media_error(reason: impl Into<String>) -> Self {
        Self {
            events: vec![(300, MediaEvent::Error(reason.into()))],
            play: PlayScript::Hang,
        }
    }

    /// Nothing ever happens
    pub fn silent() -> Self {
        Self {
            events: Vec::new(),
            play: PlayScript::Hang,
        }
    }

    /// Add an event at `at_ms` after `load()`
    pub fn with_event(mut self, at_ms: u64, event: MediaEvent) -> Self {
        self.events.push((at_ms, event));
        self
    }
}

/// Calls made on the element, in order
#[derive(Debug, Clone, PartialEq)]
pub enum ElementCall {
    ApplyAttributes(MediaAttributes),
    SetSource(String),
    ClearSource,
    Load,
    Play,
    Pause,
    AddListener(ListenerId),
    RemoveListener(ListenerId),
}

struct SimState {
    scripts: VecDeque<AttemptScript>,
    fallback: AttemptScript,
    current_play: Option<PlayScript>,
    source: Option<String>,
    attributes: Option<MediaAttributes>,
    paused: bool,
    buffered_ahead: f64,
    listeners: BTreeMap<ListenerId, Arc<Listener>>,
    next_listener: u64,
    loads: usize,
    calls: Vec<ElementCall>,
    deliveries: Vec<JoinHandle<()>>,
}

/// Scriptable [`MediaElement`]
#[derive(Clone)]
pub struct SimulatedMediaElement {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedMediaElement {
    /// Element that plays every attempt successfully
    pub fn new() -> Self {
        Self::with_scripts(Vec::new())
    }

    /// Element following `scripts`, then healthy attempts
    pub fn with_scripts(scripts: Vec<AttemptScript>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                scripts: scripts.into(),
                fallback: AttemptScript::healthy(),
                current_play: None,
                source: None,
                attributes: None,
                paused: true,
                buffered_ahead: 10.0,
                listeners: BTreeMap::new(),
                next_listener: 0,
                loads: 0,
                calls: Vec::new(),
                deliveries: Vec::new(),
            })),
        }
    }

    /// Replace the script used once the queue runs out
    pub fn with_fallback(self, fallback: AttemptScript) -> Self {
        self.lock().fallback = fallback;
        self
    }

    /// Queue more attempt scripts
    pub fn push_scripts(&self, scripts: impl IntoIterator<Item = AttemptScript>) {
        self.lock().scripts.extend(scripts);
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        // A panicking listener must not wedge the simulator
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn deliver(listeners: &[Arc<Listener>], event: MediaEvent) {
        for listener in listeners {
            listener(event.clone());
        }
    }

    /// Report `event` to the currently attached listeners
    pub fn emit(&self, event: MediaEvent) {
        let listeners: Vec<_> = self.lock().listeners.values().cloned().collect();
        Self::deliver(&listeners, event);
    }

    /// Change how `play()` settles until the next `load()`
    pub fn set_play_script(&self, play: PlayScript) {
        self.lock().current_play = Some(play);
    }

    /// Pause as an uncooperative host would, and report it
    pub fn simulate_pause(&self) {
        self.lock().paused = true;
        self.emit(MediaEvent::Pause);
    }

    /// Stall with `buffered_ahead` seconds left, and report it
    pub fn simulate_stall(&self, buffered_ahead: f64) {
        self.lock().buffered_ahead = buffered_ahead;
        self.emit(MediaEvent::Stalled);
    }

    pub fn set_buffered_ahead(&self, seconds: f64) {
        self.lock().buffered_ahead = seconds;
    }

    /// Every call made so far
    pub fn calls(&self) -> Vec<ElementCall> {
        self.lock().calls.clone()
    }

    /// Number of `play()` calls so far
    pub fn play_calls(&self) -> usize {
        self.lock().calls.iter().filter(|c| **c == ElementCall::Play).count()
    }

    /// Number of `load()` calls so far
    pub fn loads(&self) -> usize {
        self.lock().loads
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn source(&self) -> Option<String> {
        self.lock().source.clone()
    }

    pub fn attributes(&self) -> Option<MediaAttributes> {
        self.lock().attributes.clone()
    }
}

impl Default for SimulatedMediaElement {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SimulatedMediaElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("SimulatedMediaElement")
            .field("source", &state.source)
            .field("paused", &state.paused)
            .field("loads", &state.loads)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

#[async_trait]
impl MediaElement for SimulatedMediaElement {
    fn apply_attributes(&self, attributes: &MediaAttributes) {
        let mut state = self.lock();
        state.attributes = Some(attributes.clone());
        state.calls.push(ElementCall::ApplyAttributes(attributes.clone()));
    }

    fn set_source(&self, url: &str) {
        let mut state = self.lock();
        state.source = Some(url.to_string());
        state.calls.push(ElementCall::SetSource(url.to_string()));
    }

    fn clear_source(&self) {
        let mut state = self.lock();
        state.source = None;
        state.current_play = None;
        state.calls.push(ElementCall::ClearSource);
    }

    fn load(&self) {
        let mut state = self.lock();
        state.calls.push(ElementCall::Load);
        state.loads += 1;
        state.paused = true;

        let script = match state.scripts.pop_front() {
            Some(script) => script,
            None => state.fallback.clone(),
        };
        state.current_play = Some(script.play.clone());

        let listeners: Vec<_> = state.listeners.values().cloned().collect();
        let mut events = script.events;
        events.sort_by_key(|(at, _)| *at);
        debug!(load = state.loads, events = events.len(), "Simulated load");

        state.deliveries.retain(|d| !d.is_finished());
        state.deliveries.push(tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            for (at_ms, event) in events {
                tokio::time::sleep_until(start + Duration::from_millis(at_ms)).await;
                Self::deliver(&listeners, event);
            }
        }));
    }

    async fn play(&self) -> std::result::Result<(), String> {
        let script = {
            let mut state = self.lock();
            state.calls.push(ElementCall::Play);
            state.current_play.clone()
        };

        match script {
            None => Err("NotSupportedError: no source".to_string()),
            Some(PlayScript::Resolve { after_ms }) => {
                tokio::time::sleep(Duration::from_millis(after_ms)).await;
                self.lock().paused = false;
                self.emit(MediaEvent::Playing);
                Ok(())
            }
            Some(PlayScript::Reject { after_ms, reason }) => {
                tokio::time::sleep(Duration::from_millis(after_ms)).await;
                Err(reason)
            }
            Some(PlayScript::Hang) => std::future::pending().await,
        }
    }

    fn pause(&self) {
        let mut state = self.lock();
        state.paused = true;
        state.calls.push(ElementCall::Pause);
    }

    fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn buffered_ahead(&self) -> f64 {
        self.lock().buffered_ahead
    }

    fn add_listener(&self, listener: Listener) -> ListenerId {
        let mut state = self.lock();
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);
        state.listeners.insert(id, Arc::new(listener));
        state.calls.push(ElementCall::AddListener(id));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        let mut state = self.lock();
        state.listeners.remove(&id);
        state.calls.push(ElementCall::RemoveListener(id));
    }
}

impl Drop for SimState {
    fn drop(&mut self) {
        for delivery in self.deliveries.drain(..) {
            delivery.abort();
        }
    }
}
