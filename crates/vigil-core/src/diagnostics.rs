//! Structured diagnostics
//!
//! Signage screens rarely expose a developer console, so every transition
//! and recovery action is kept as a structured record:
//! - emitted through `tracing` with the session's generation and retry count
//! - retained in a bounded in-memory ring for later inspection
//! - broadcast to live subscribers (CLI, on-screen debug overlays)

use crate::types::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Recovery actions taken while playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfHealAction {
    /// `play()` reissued after an unexpected pause
    Resume,
    /// `load()` + `play()` after a stall or mid-playback error
    Reload,
}

/// Diagnostic event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    /// Attributes applied, source assigned, load issued
    AttemptStarted {
        source: String,
    },

    /// State machine moved
    StateChange {
        from: PlaybackState,
        to: PlaybackState,
    },

    /// An attempt failed
    Failure {
        code: String,
        message: String,
    },

    /// Fresh attempt queued behind the backoff
    RetryScheduled {
        delay_ms: u64,
    },

    /// Self-heal issued while playing
    SelfHeal {
        action: SelfHealAction,
    },

    /// A self-heal did not get the element playing again
    SelfHealFailed {
        action: SelfHealAction,
        reason: String,
    },

    /// A signal from an abandoned attempt was discarded
    StaleSignalDropped {
        signal_generation: Generation,
        signal: String,
    },

    /// Presentation layer asked for a retry from `Error`
    ManualRetry,

    /// Presentation layer pointed the slot at another source
    SourceChanged {
        source: String,
    },

    /// Timers cancelled, listeners detached, element released
    Teardown,
}

/// Session fields stamped on every record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticContext {
    pub generation: Generation,
    pub retry_count: u32,
    pub device_class: DeviceClass,
}

/// Diagnostic event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    /// Unique record ID
    pub id: Uuid,
    /// Session ID
    pub session_id: SessionId,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Sequence number
    pub sequence: u64,
    #[serde(flatten)]
    pub context: DiagnosticContext,
    /// The event
    #[serde(flatten)]
    pub event: DiagnosticEvent,
}

struct Ring {
    sequence: u64,
    records: VecDeque<DiagnosticRecord>,
}

/// Diagnostics log for one controller session
pub struct DiagnosticsLog {
    session_id: SessionId,
    capacity: usize,
    ring: RwLock<Ring>,
    live_tx: broadcast::Sender<DiagnosticRecord>,
}

impl DiagnosticsLog {
    /// Create a log retaining at most `capacity` records
    pub fn new(session_id: SessionId, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (live_tx, _) = broadcast::channel(capacity);
        Self {
            session_id,
            capacity,
            ring: RwLock::new(Ring {
                sequence: 0,
                records: VecDeque::with_capacity(capacity),
            }),
            live_tx,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Record an event
    pub async fn emit(&self, context: DiagnosticContext, event: DiagnosticEvent) {
        Self::trace(&context, &event);

        let mut ring = self.ring.write().await;
        ring.sequence += 1;

        let record = DiagnosticRecord {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            timestamp: Utc::now(),
            sequence: ring.sequence,
            context,
            event,
        };

        if ring.records.len() == self.capacity {
            ring.records.pop_front();
        }
        ring.records.push_back(record.clone());
        drop(ring);

        // No subscribers is the normal case
        let _ = self.live_tx.send(record);
    }

    fn trace(ctx: &DiagnosticContext, event: &DiagnosticEvent) {
        let generation = ctx.generation.0;
        let retry_count = ctx.retry_count;
        let device = ctx.device_class.to_string();
        let device = device.as_str();
        match event {
            DiagnosticEvent::StateChange { from, to } => {
                info!(generation, retry_count, device, from = %from, to = %to, "Playback state transition");
            }
            DiagnosticEvent::Failure { code, message } => {
                warn!(generation, retry_count, device, code = %code, message = %message, "Playback attempt failed");
            }
            DiagnosticEvent::AttemptStarted { source } => {
                info!(generation, retry_count, device, source = %source, "Playback attempt started");
            }
            DiagnosticEvent::RetryScheduled { delay_ms } => {
                info!(generation, retry_count, device, delay_ms, "Retry scheduled");
            }
            DiagnosticEvent::SelfHeal { action } => {
                info!(generation, retry_count, device, action = ?action, "Self-heal issued");
            }
            DiagnosticEvent::SelfHealFailed { action, reason } => {
                warn!(generation, retry_count, device, action = ?action, reason = %reason, "Self-heal failed, restarting playback");
            }
            DiagnosticEvent::StaleSignalDropped { signal_generation, signal } => {
                debug!(generation, signal_generation = signal_generation.0, signal = %signal, "Stale signal dropped");
            }
            DiagnosticEvent::ManualRetry => {
                info!(generation, device, "Manual retry");
            }
            DiagnosticEvent::SourceChanged { source } => {
                info!(generation, device, source = %source, "Media source changed");
            }
            DiagnosticEvent::Teardown => {
                debug!(generation, device, "Controller torn down");
            }
        }
    }

    /// Get retained records, oldest first
    pub async fn records(&self) -> Vec<DiagnosticRecord> {
        self.ring.read().await.records.iter().cloned().collect()
    }

    /// State changes retained in the ring, oldest first
    pub async fn state_changes(&self) -> Vec<(PlaybackState, PlaybackState)> {
        self.ring
            .read()
            .await
            .records
            .iter()
            .filter_map(|r| match r.event {
                DiagnosticEvent::StateChange { from, to } => Some((from, to)),
                _ => None,
            })
            .collect()
    }

    /// Receive records as they are emitted
    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticRecord> {
        self.live_tx.subscribe()
    }
}
