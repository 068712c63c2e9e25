//! Controller configuration
//!
//! Per-class tuning plus the timing knobs shared by both classes. Top-level
//! keys are optional; a tuning table, when given, must be complete.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables applied to one device class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileTuning {
    /// Maximum wait for metadata after `load()` (milliseconds)
    pub metadata_timeout_ms: u64,
    /// Maximum wait from readiness to a resolved `play()` (milliseconds)
    pub play_ready_timeout_ms: u64,
    /// Automatic retries before giving up
    pub max_retries: u32,
    /// Pause between readiness and `play()` (milliseconds)
    pub warmup_delay_ms: u64,
}

impl ProfileTuning {
    /// Defaults for desktop and mobile browsers
    pub fn interactive() -> Self {
        Self {
            metadata_timeout_ms: 15_000,
            play_ready_timeout_ms: 10_000,
            max_retries: 3,
            warmup_delay_ms: 0,
        }
    }

    /// Defaults for embedded TV browsers
    pub fn tv() -> Self {
        Self {
            metadata_timeout_ms: 45_000,
            play_ready_timeout_ms: 30_000,
            max_retries: 5,
            warmup_delay_ms: 1_000,
        }
    }

    fn validate(&self, label: &str) -> Result<()> {
        if self.metadata_timeout_ms == 0 {
            return Err(Error::InvalidConfig(format!("{label}.metadata_timeout_ms must be positive")));
        }
        if self.play_ready_timeout_ms == 0 {
            return Err(Error::InvalidConfig(format!("{label}.play_ready_timeout_ms must be positive")));
        }
        if self.max_retries == 0 {
            return Err(Error::InvalidConfig(format!("{label}.max_retries must be positive")));
        }
        Ok(())
    }
}

/// Playback controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Tuning for desktop and mobile browsers
    pub interactive: ProfileTuning,
    /// Tuning for TV-class browsers
    pub tv: ProfileTuning,
    /// Fixed wait before a retried attempt (milliseconds)
    pub backoff_ms: u64,
    /// Delay before resuming after an unexpected pause (milliseconds)
    pub resume_delay_ms: u64,
    /// Delay before reloading after a stall (milliseconds)
    pub stall_reload_delay_ms: u64,
    /// Buffered-ahead level under which a stall triggers a reload (seconds)
    pub stall_buffer_threshold_secs: f64,
    /// Number of diagnostic records kept in memory
    pub diagnostics_capacity: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interactive: ProfileTuning::interactive(),
            tv: ProfileTuning::tv(),
            backoff_ms: 2_500,
            resume_delay_ms: 1_000,
            stall_reload_delay_ms: 2_000,
            stall_buffer_threshold_secs: 0.5,
            diagnostics_capacity: 256,
        }
    }
}

impl ControllerConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ControllerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check invariants the controller relies on
    pub fn validate(&self) -> Result<()> {
        self.interactive.validate("interactive")?;
        self.tv.validate("tv")?;
        if self.diagnostics_capacity == 0 {
            return Err(Error::InvalidConfig("diagnostics_capacity must be positive".into()));
        }
        if !self.stall_buffer_threshold_secs.is_finite() || self.stall_buffer_threshold_secs < 0.0 {
            return Err(Error::InvalidConfig(
                "stall_buffer_threshold_secs must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn resume_delay(&self) -> Duration {
        Duration::from_millis(self.resume_delay_ms)
    }

    pub fn stall_reload_delay(&self) -> Duration {
        Duration::from_millis(self.stall_reload_delay_ms)
    }
}
