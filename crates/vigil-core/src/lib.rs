//! Vigil Core - Playback Recovery for Unattended Signage Video
//!
//! This crate keeps a looping, muted video playing on screens nobody watches:
//! - Device profiling (interactive browsers vs. TV-class embedded browsers)
//! - Per-slot playback state machine with bounded automatic retries
//! - Generation-stamped signals so late events from abandoned attempts are dropped
//! - Self-healing of unexpected pauses and buffer stalls
//! - Structured diagnostics for screens without a developer console
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Vigil Core                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐           │
//! │  │    Device    │  │  Controller  │  │   Pending    │           │
//! │  │   Profiler   │  │    Config    │  │    Tasks     │           │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘           │
//! │         │                 │                 │                   │
//! │         └─────────────────┼─────────────────┘                   │
//! │                           │                                     │
//! │                    ┌──────┴──────┐                              │
//! │                    │  Playback   │◄──── signals (generation)    │
//! │                    │ Controller  │                              │
//! │                    └──────┬──────┘                              │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴──────┐  ┌──────────────┐            │
//! │  │ Diagnostics  │  │  Playback   │  │    Media     │            │
//! │  │     Log      │  │   Session   │  │   Element    │            │
//! │  └──────────────┘  └─────────────┘  └──────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod types;
pub mod config;
pub mod profile;
pub mod media;
pub mod session;
pub mod diagnostics;
pub mod timer;
pub mod controller;
pub mod shell;
#[cfg(feature = "simulation")]
pub mod sim;

pub use error::{Error, PlaybackFailure, Result};
pub use types::*;
pub use config::{ControllerConfig, ProfileTuning};
pub use profile::{ClassificationReason, DeviceProfile, DeviceProfiler, Environment};
pub use media::{ListenerGuard, ListenerId, MediaAttributes, MediaElement, MediaEvent};
pub use session::PlaybackSession;
pub use diagnostics::{DiagnosticEvent, DiagnosticRecord, DiagnosticsLog, SelfHealAction};
pub use controller::{ControllerBuilder, PlaybackController};
pub use shell::Overlay;
#[cfg(feature = "simulation")]
pub use sim::{AttemptScript, PlayScript, SimulatedMediaElement};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library with default configuration
pub fn init() {
    tracing::info!(version = VERSION, "Vigil Core initialized");
}
