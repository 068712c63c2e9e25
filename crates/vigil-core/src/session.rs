//! Playback session - the state machine behind one media slot
//!
//! Pure bookkeeping: no timers, no element, no I/O. The controller task is the
//! only owner and the only caller of the transition functions below. Every
//! function that reacts to an asynchronous outcome takes the generation that
//! outcome was stamped with and refuses to act on anything but the current one.

use crate::{
    error::PlaybackFailure,
    types::*,
};
use tracing::warn;

/// A state change applied by one of the transition functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PlaybackState,
    pub to: PlaybackState,
}

/// What the controller should do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Start a fresh attempt under `generation` after the backoff
    Retry {
        generation: Generation,
        retry_count: u32,
        transition: Transition,
    },
    /// Retries exhausted; the session now sits in `Error`
    Exhausted {
        message: String,
        transition: Transition,
    },
}

/// State of a single media slot
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    /// Source as provided by the presentation layer
    source_url: String,
    /// Source as handed to the element
    resolved_url: String,
    state: PlaybackState,
    retry_count: u32,
    max_retries: u32,
    last_error_message: Option<String>,
    generation: Generation,
}

impl PlaybackSession {
    /// Create a session in `Loading` under generation 1
    pub fn new(source_url: impl Into<String>, resolved_url: impl Into<String>, max_retries: u32) -> Self {
        Self {
            source_url: source_url.into(),
            resolved_url: resolved_url.into(),
            state: PlaybackState::Loading,
            retry_count: 0,
            max_retries,
            last_error_message: None,
            generation: Generation(1),
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn resolved_url(&self) -> &str {
        &self.resolved_url
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn last_error_message(&self) -> Option<&str> {
        self.last_error_message.as_deref()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// True if `generation` is the live attempt
    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation == generation
    }

    /// Snapshot for the presentation layer
    pub fn view(&self, device_class: DeviceClass) -> PlaybackView {
        PlaybackView {
            state: self.state,
            retry_count: self.retry_count,
            max_retries: self.max_retries,
            last_error_message: self.last_error_message.clone(),
            generation: self.generation,
            device_class,
        }
    }

    fn set_state(&mut self, to: PlaybackState) -> Transition {
        let from = self.state;
        if !from.can_transition_to(to) {
            // Callers guard every transition; reaching this is a bug, not a runtime condition.
            warn!(from = %from, to = %to, "Unexpected playback state transition");
        }
        self.state = to;
        Transition { from, to }
    }

    /// Metadata arrived for `generation`: `Loading -> Ready`
    pub fn metadata_loaded(&mut self, generation: Generation) -> Option<Transition> {
        if !self.is_current(generation) || self.state != PlaybackState::Loading {
            return None;
        }
        Some(self.set_state(PlaybackState::Ready))
    }

    /// `play()` resolved for `generation`: `Ready -> Playing`
    ///
    /// Reaching `Playing` clears the retry counter; the next failure starts a
    /// fresh budget.
    pub fn play_started(&mut self, generation: Generation) -> Option<Transition> {
        if !self.is_current(generation) || self.state != PlaybackState::Ready {
            return None;
        }
        self.retry_count = 0;
        Some(self.set_state(PlaybackState::Playing))
    }

    /// An attempt under `generation` failed
    ///
    /// Returns `None` when the failure is stale or arrives outside `Loading`
    /// and `Ready`.
    pub fn fail(&mut self, generation: Generation, failure: &PlaybackFailure) -> Option<FailureOutcome> {
        if !self.is_current(generation) || !self.state.is_pending() {
            return None;
        }

        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.generation = self.generation.next();
            let transition = self.set_state(PlaybackState::Loading);
            Some(FailureOutcome::Retry {
                generation: self.generation,
                retry_count: self.retry_count,
                transition,
            })
        } else {
            let message = failure.to_string();
            self.last_error_message = Some(message.clone());
            let transition = self.set_state(PlaybackState::Error);
            Some(FailureOutcome::Exhausted { message, transition })
        }
    }

    /// Self-healing failed while `Playing` under `generation`
    ///
    /// Restarts from `Loading` under a new generation. The retry counter is
    /// left alone; only failed load attempts spend the retry budget.
    pub fn playback_lost(&mut self, generation: Generation) -> Option<(Generation, Transition)> {
        if !self.is_current(generation) || self.state != PlaybackState::Playing {
            return None;
        }
        self.generation = self.generation.next();
        let transition = self.set_state(PlaybackState::Loading);
        Some((self.generation, transition))
    }

    /// Manual retry from `Error`; a no-op in any other state
    pub fn manual_retry(&mut self) -> Option<(Generation, Transition)> {
        if self.state != PlaybackState::Error {
            return None;
        }
        self.retry_count = 0;
        self.last_error_message = None;
        self.generation = self.generation.next();
        let transition = self.set_state(PlaybackState::Loading);
        Some((self.generation, transition))
    }

    /// Point the slot at a new source and restart from `Loading`
    pub fn change_source(
        &mut self,
        source_url: impl Into<String>,
        resolved_url: impl Into<String>,
    ) -> (Generation, Transition) {
        self.source_url = source_url.into();
        self.resolved_url = resolved_url.into();
        self.retry_count = 0;
        self.last_error_message = None;
        self.generation = self.generation.next();
        let transition = self.set_state(PlaybackState::Loading);
        (self.generation, transition)
    }
}
