//! Device profiling
//!
//! Classifies the host environment once per session as either an interactive
//! browser or a TV-class embedded browser and derives the playback tunables
//! from that. No single signal is trusted on its own: desktop monitors can
//! match TV resolutions and some TV browsers send generic user agents, so the
//! classifier leans towards TV-class whenever the evidence is mixed.

use crate::{
    config::{ControllerConfig, ProfileTuning},
    types::{DeviceClass, PreloadStrategy},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Lower-cased user-agent fragments that identify TV platforms
const TV_UA_TOKENS: &[&str] = &[
    "smart-tv",
    "smarttv",
    "tizen",
    "webos",
    "web0s",
    "netcast",
    "hbbtv",
    "roku",
    "crkey",
    "googletv",
    "android tv",
    "appletv",
    "bravia",
    "aftb",
    "aftt",
    "aftm",
    "viera",
    "vidaa",
    "philipstv",
    "tv safari",
    "large screen",
];

/// Minimum viewport for the large-screen heuristic
const LARGE_SCREEN_MIN_WIDTH: u32 = 1920;
const LARGE_SCREEN_MIN_HEIGHT: u32 = 1080;

/// Width/height band of television panels (16:9 sits at 1.78)
const TV_ASPECT_MIN: f64 = 1.70;
const TV_ASPECT_MAX: f64 = 1.80;

/// Facts about the runtime the profiler is allowed to look at
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Environment {
    /// Raw user-agent string
    pub user_agent: String,
    /// Reported viewport width in CSS pixels
    pub viewport_width: u32,
    /// Reported viewport height in CSS pixels
    pub viewport_height: u32,
    /// Whether touch events are supported
    pub touch_events: bool,
    /// Maximum simultaneous touch points
    pub max_touch_points: u32,
    /// Origin of the hosting page, used to absolutize relative sources
    pub page_origin: Option<Url>,
}

impl Environment {
    /// Width divided by height, `None` for a degenerate viewport
    pub fn aspect_ratio(&self) -> Option<f64> {
        if self.viewport_height == 0 {
            return None;
        }
        Some(self.viewport_width as f64 / self.viewport_height as f64)
    }

    fn has_touch(&self) -> bool {
        self.touch_events || self.max_touch_points > 0
    }
}

/// Which signal decided the classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", content = "detail", rename_all = "snake_case")]
pub enum ClassificationReason {
    /// User agent contains a known TV token
    UserAgentToken(String),
    /// Large viewport with a television aspect ratio, touch present
    LargeScreen,
    /// Large viewport with a television aspect ratio and no touch input
    LargeScreenNoTouch,
    /// Nothing pointed at a TV
    NoSignal,
}

/// Playback parameters for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub classification: DeviceClass,
    pub reason: ClassificationReason,
    pub metadata_timeout_ms: u64,
    pub play_ready_timeout_ms: u64,
    pub max_retries: u32,
    pub preload_strategy: PreloadStrategy,
    pub requires_absolute_url: bool,
    pub warmup_delay_ms: u64,
}

impl DeviceProfile {
    /// Build the profile for a class from its tuning table
    pub fn for_class(classification: DeviceClass, reason: ClassificationReason, tuning: &ProfileTuning) -> Self {
        let tv = classification == DeviceClass::TvClass;
        Self {
            classification,
            reason,
            metadata_timeout_ms: tuning.metadata_timeout_ms,
            play_ready_timeout_ms: tuning.play_ready_timeout_ms,
            max_retries: tuning.max_retries,
            preload_strategy: if tv { PreloadStrategy::Full } else { PreloadStrategy::MetadataOnly },
            requires_absolute_url: tv,
            warmup_delay_ms: tuning.warmup_delay_ms,
        }
    }

    /// Default interactive profile
    pub fn interactive() -> Self {
        Self::for_class(DeviceClass::Interactive, ClassificationReason::NoSignal, &ProfileTuning::interactive())
    }

    /// Default TV-class profile
    pub fn tv() -> Self {
        Self::for_class(
            DeviceClass::TvClass,
            ClassificationReason::UserAgentToken("tizen".into()),
            &ProfileTuning::tv(),
        )
    }

    pub fn is_tv(&self) -> bool {
        self.classification == DeviceClass::TvClass
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn play_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.play_ready_timeout_ms)
    }

    pub fn warmup_delay(&self) -> Duration {
        Duration::from_millis(self.warmup_delay_ms)
    }

    /// Resolve a raw source reference into the URL handed to the element
    ///
    /// Profiles that require absolute URLs join relative references onto the
    /// page origin. Absolute references are always used as given.
    pub fn resolve_source(&self, source: &str, page_origin: Option<&Url>) -> Result<String> {
        if !self.requires_absolute_url || Url::parse(source).is_ok() {
            return Ok(source.to_string());
        }

        let origin = page_origin.ok_or_else(|| Error::SourceResolution {
            source_ref: source.to_string(),
            reason: "no page origin available".into(),
        })?;

        origin
            .join(source)
            .map(|url| url.to_string())
            .map_err(|e| Error::SourceResolution {
                source_ref: source.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Environment classifier
#[derive(Debug, Clone)]
pub struct DeviceProfiler {
    interactive: ProfileTuning,
    tv: ProfileTuning,
}

impl DeviceProfiler {
    /// Profiler using the default tuning tables
    pub fn new() -> Self {
        Self::with_config(&ControllerConfig::default())
    }

    /// Profiler using the tuning tables from a configuration
    pub fn with_config(config: &ControllerConfig) -> Self {
        Self {
            interactive: config.interactive.clone(),
            tv: config.tv.clone(),
        }
    }

    /// Classify an environment
    pub fn classify(&self, env: &Environment) -> DeviceProfile {
        let reason = Self::detect(env);
        let (class, tuning) = match reason {
            ClassificationReason::NoSignal => (DeviceClass::Interactive, &self.interactive),
            _ => (DeviceClass::TvClass, &self.tv),
        };

        debug!(
            class = %class,
            reason = ?reason,
            width = env.viewport_width,
            height = env.viewport_height,
            "Device classified"
        );

        DeviceProfile::for_class(class, reason, tuning)
    }

    fn detect(env: &Environment) -> ClassificationReason {
        let ua = env.user_agent.to_lowercase();
        if let Some(token) = TV_UA_TOKENS.iter().find(|t| ua.contains(*t)) {
            return ClassificationReason::UserAgentToken((*token).to_string());
        }

        let large = env.viewport_width >= LARGE_SCREEN_MIN_WIDTH
            && env.viewport_height >= LARGE_SCREEN_MIN_HEIGHT;
        let tv_aspect = env
            .aspect_ratio()
            .map(|r| (TV_ASPECT_MIN..=TV_ASPECT_MAX).contains(&r))
            .unwrap_or(false);

        match (large && tv_aspect, env.has_touch()) {
            (true, false) => ClassificationReason::LargeScreenNoTouch,
            (true, true) => ClassificationReason::LargeScreen,
            (false, _) => ClassificationReason::NoSignal,
        }
    }
}

impl Default for DeviceProfiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a source, falling back to the raw reference when resolution fails
pub(crate) fn resolve_or_raw(profile: &DeviceProfile, source: &str, origin: Option<&Url>) -> String {
    match profile.resolve_source(source, origin) {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!(error = %e, source, "Using media source unresolved");
            source.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESKTOP_UA: &str =
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0 Safari/537.36";
    const TIZEN_UA: &str =
        "Mozilla/5.0 (SMART-TV; LINUX; Tizen 6.0) AppleWebKit/537.36 (KHTML, like Gecko) 85.0.4183.93/6.0 TV Safari/537.36";

    fn env(ua: &str, w: u32, h: u32, touch: bool) -> Environment {
        Environment {
            user_agent: ua.to_string(),
            viewport_width: w,
            viewport_height: h,
            touch_events: touch,
            max_touch_points: if touch { 5 } else { 0 },
            page_origin: None,
        }
    }

    #[test]
    fn test_user_agent_token_wins() {
        let profile = DeviceProfiler::new().classify(&env(TIZEN_UA, 960, 540, false));
        assert_eq!(profile.classification, DeviceClass::TvClass);
        assert_eq!(profile.reason, ClassificationReason::UserAgentToken("smart-tv".into()));
        assert_eq!(profile.preload_strategy, PreloadStrategy::Full);
        assert!(profile.requires_absolute_url);
        assert_eq!(profile.max_retries, 5);
    }

    #[test]
    fn test_large_16_9_without_touch_is_tv() {
        let profile = DeviceProfiler::new().classify(&env(DESKTOP_UA, 3840, 2160, false));
        assert_eq!(profile.classification, DeviceClass::TvClass);
        assert_eq!(profile.reason, ClassificationReason::LargeScreenNoTouch);
    }

    #[test]
    fn test_large_16_9_with_touch_is_still_tv() {
        let profile = DeviceProfiler::new().classify(&env(DESKTOP_UA, 1920, 1080, true));
        assert_eq!(profile.classification, DeviceClass::TvClass);
        assert_eq!(profile.reason, ClassificationReason::LargeScreen);
    }

    #[test]
    fn test_desktop_16_10_is_interactive() {
        let profile = DeviceProfiler::new().classify(&env(DESKTOP_UA, 2560, 1600, false));
        assert_eq!(profile.classification, DeviceClass::Interactive);
        assert_eq!(profile.preload_strategy, PreloadStrategy::MetadataOnly);
        assert!(!profile.requires_absolute_url);
        assert_eq!(profile.max_retries, 3);
    }

    #[test]
    fn test_ultrawide_and_small_screens_are_interactive() {
        let profiler = DeviceProfiler::new();
        assert_eq!(profiler.classify(&env(DESKTOP_UA, 3440, 1440, false)).classification, DeviceClass::Interactive);
        assert_eq!(profiler.classify(&env(DESKTOP_UA, 1280, 720, false)).classification, DeviceClass::Interactive);
        assert_eq!(profiler.classify(&env("", 0, 0, false)).classification, DeviceClass::Interactive);
    }

    #[test]
    fn test_tv_gets_longer_timeouts() {
        let tv = DeviceProfile::tv();
        let desktop = DeviceProfile::interactive();
        assert!(tv.metadata_timeout() > desktop.metadata_timeout());
        assert!(tv.play_ready_timeout() > desktop.play_ready_timeout());
        assert!(tv.warmup_delay() > Duration::ZERO);
        assert_eq!(desktop.warmup_delay(), Duration::ZERO);
    }

    #[test]
    fn test_resolve_relative_source_against_origin() {
        let origin = Url::parse("https://signage.example.com/screen/lobby").unwrap();
        let tv = DeviceProfile::tv();

        assert_eq!(
            tv.resolve_source("/videos/video3.mp4", Some(&origin)).unwrap(),
            "https://signage.example.com/videos/video3.mp4"
        );
        assert_eq!(
            tv.resolve_source("https://cdn.example.com/a.mp4", Some(&origin)).unwrap(),
            "https://cdn.example.com/a.mp4"
        );
        assert!(tv.resolve_source("/videos/video3.mp4", None).is_err());
    }

    #[test]
    fn test_interactive_keeps_relative_source() {
        let profile = DeviceProfile::interactive();
        assert_eq!(profile.resolve_source("/videos/video3.mp4", None).unwrap(), "/videos/video3.mp4");
        assert_eq!(resolve_or_raw(&DeviceProfile::tv(), "/v.mp4", None), "/v.mp4");
    }
}
