//! Integration tests for Vigil Core
//!
//! Every test runs on a paused tokio clock, so timeouts and backoffs elapse
//! instantly and in a deterministic order.

use std::sync::Arc;
use std::time::Duration;

use vigil_core::{
    sim::ElementCall, AttemptScript, ControllerConfig, DeviceClass, DeviceProfile, DiagnosticEvent,
    Environment, Generation, MediaElement, MediaEvent, Overlay, PlayScript, PlaybackController,
    PlaybackState, ProfileTuning, SelfHealAction, SimulatedMediaElement,
};

// =============================================================================
// Helpers
// =============================================================================

fn controller(sim: &SimulatedMediaElement, profile: DeviceProfile) -> PlaybackController {
    PlaybackController::builder(Arc::new(sim.clone()))
        .profile(profile)
        .spawn("/videos/video3.mp4")
}

async fn failure_codes(controller: &PlaybackController) -> Vec<String> {
    controller
        .diagnostics()
        .await
        .into_iter()
        .filter_map(|r| match r.event {
            DiagnosticEvent::Failure { code, .. } => Some(code),
            _ => None,
        })
        .collect()
}

fn is_playing(view: &vigil_core::PlaybackView) -> bool {
    view.state == PlaybackState::Playing
}

fn is_error(view: &vigil_core::PlaybackView) -> bool {
    view.state == PlaybackState::Error
}

// =============================================================================
// Lifecycle Scenarios
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_tv_plays_first_time() {
    let sim = SimulatedMediaElement::new();
    let controller = controller(&sim, DeviceProfile::tv());

    let view = controller.wait_for(is_playing).await.unwrap();
    assert_eq!(view.retry_count, 0);
    assert_eq!(view.device_class, DeviceClass::TvClass);
    assert_eq!(sim.loads(), 1);
    assert_eq!(
        controller.transitions().await,
        vec![
            (PlaybackState::Loading, PlaybackState::Ready),
            (PlaybackState::Ready, PlaybackState::Playing),
        ]
    );
    assert_eq!(Overlay::for_view(&view), Overlay::None);
}

#[tokio::test(start_paused = true)]
async fn test_tv_waits_for_warmup_before_play() {
    let sim = SimulatedMediaElement::new();
    let controller = controller(&sim, DeviceProfile::tv());

    // CanPlay arrives at 400ms; the 1000ms warmup holds play() back
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(controller.state(), PlaybackState::Ready);
    assert_eq!(sim.play_calls(), 0);

    controller.wait_for(is_playing).await.unwrap();
    assert_eq!(sim.play_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_autoplay_rejections_then_success() {
    let sim = SimulatedMediaElement::with_scripts(vec![
        AttemptScript::play_rejected("NotAllowedError"),
        AttemptScript::play_rejected("NotAllowedError"),
    ]);
    let controller = controller(&sim, DeviceProfile::interactive());

    let view = controller.wait_for(|v| v.retry_count == 2).await.unwrap();
    assert_eq!(
        Overlay::for_view(&view),
        Overlay::Spinner { retrying: Some((2, 3)) }
    );

    let view = controller.wait_for(is_playing).await.unwrap();
    assert_eq!(view.retry_count, 0);
    assert_eq!(sim.loads(), 3);
    assert_eq!(failure_codes(&controller).await, vec!["PLAY_REJECTED", "PLAY_REJECTED"]);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_media_error_exhausts_retries() {
    let sim = SimulatedMediaElement::new().with_fallback(AttemptScript::media_error("MEDIA_ERR_NETWORK"));
    let controller = controller(&sim, DeviceProfile::interactive());

    let view = controller.wait_for(is_error).await.unwrap();
    assert_eq!(view.retry_count, view.max_retries);
    assert_eq!(view.last_error_message.as_deref(), Some("Media error: MEDIA_ERR_NETWORK"));
    assert_eq!(sim.loads(), 4);

    // No automatic attempt ever follows ERROR
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(controller.state(), PlaybackState::Error);
    assert_eq!(sim.loads(), 4);
    assert_eq!(failure_codes(&controller).await.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_metadata_timeout_retries() {
    let sim = SimulatedMediaElement::with_scripts(vec![AttemptScript::silent()]);
    let controller = controller(&sim, DeviceProfile::interactive());

    tokio::time::sleep(Duration::from_secs(14)).await;
    assert_eq!(controller.state(), PlaybackState::Loading);
    assert_eq!(controller.view().retry_count, 0);

    let view = controller.wait_for(is_playing).await.unwrap();
    assert_eq!(view.retry_count, 0);
    assert_eq!(failure_codes(&controller).await, vec!["METADATA_TIMEOUT"]);
}

#[tokio::test(start_paused = true)]
async fn test_readiness_timeout_retries() {
    let stuck = AttemptScript {
        events: vec![(200, MediaEvent::LoadedMetadata)],
        play: PlayScript::Hang,
    };
    let sim = SimulatedMediaElement::with_scripts(vec![stuck]);
    let controller = controller(&sim, DeviceProfile::interactive());

    let view = controller.wait_for(|v| v.retry_count == 1).await.unwrap();
    assert_eq!(view.state, PlaybackState::Loading);
    assert_eq!(failure_codes(&controller).await, vec!["READINESS_TIMEOUT"]);

    controller.wait_for(is_playing).await.unwrap();
}

// =============================================================================
// Self-Healing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_unexpected_pause_is_resumed() {
    let sim = SimulatedMediaElement::new();
    let controller = controller(&sim, DeviceProfile::interactive());
    controller.wait_for(is_playing).await.unwrap();
    let plays = sim.play_calls();

    sim.simulate_pause();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(controller.state(), PlaybackState::Playing);
    assert_eq!(controller.view().retry_count, 0);
    assert_eq!(sim.play_calls(), plays + 1);
    assert!(!sim.is_paused());
    assert!(controller
        .diagnostics()
        .await
        .iter()
        .any(|r| r.event == DiagnosticEvent::SelfHeal { action: SelfHealAction::Resume }));
}

#[tokio::test(start_paused = true)]
async fn test_error_while_playing_reloads_in_place() {
    let sim = SimulatedMediaElement::new();
    let controller = controller(&sim, DeviceProfile::interactive());
    controller.wait_for(is_playing).await.unwrap();

    sim.emit(MediaEvent::Error("decode".into()));
    tokio::time::sleep(Duration::from_secs(3)).await;

    assert_eq!(controller.state(), PlaybackState::Playing);
    assert_eq!(sim.loads(), 2);
    assert!(failure_codes(&controller).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_second_pause_does_not_delay_resume() {
    let sim = SimulatedMediaElement::new();
    let controller = controller(&sim, DeviceProfile::interactive());
    controller.wait_for(is_playing).await.unwrap();
    let plays = sim.play_calls();

    sim.simulate_pause();
    tokio::time::sleep(Duration::from_millis(800)).await;
    sim.simulate_pause();

    // Resume is due 1000ms after the first pause, not the second
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!sim.is_paused());
    assert_eq!(sim.play_calls(), plays + 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(sim.play_calls(), plays + 1);
    assert_eq!(controller.state(), PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_second_stall_does_not_delay_reload() {
    let sim = SimulatedMediaElement::new();
    let controller = controller(&sim, DeviceProfile::interactive());
    controller.wait_for(is_playing).await.unwrap();

    sim.simulate_stall(0.1);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    sim.simulate_stall(0.1);

    // Reload is due 2000ms after the first stall, not the second
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(sim.loads(), 2);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sim.loads(), 2);
    assert_eq!(controller.state(), PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_resume_restarts_playback() {
    let sim = SimulatedMediaElement::new();
    let controller = controller(&sim, DeviceProfile::interactive());
    let playing = controller.wait_for(is_playing).await.unwrap();

    sim.set_play_script(PlayScript::Reject {
        after_ms: 50,
        reason: "NotAllowedError".into(),
    });
    sim.simulate_pause();

    let view = controller.wait_for(|v| v.state == PlaybackState::Loading).await.unwrap();
    assert_eq!(view.retry_count, 0);
    assert_eq!(view.generation, playing.generation.next());

    let view = controller.wait_for(is_playing).await.unwrap();
    assert_eq!(view.retry_count, 0);
    assert_eq!(sim.loads(), 2);
    assert!(failure_codes(&controller).await.is_empty());
    assert!(controller.diagnostics().await.iter().any(|r| matches!(
        r.event,
        DiagnosticEvent::SelfHealFailed { action: SelfHealAction::Resume, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_reload_restarts_playback() {
    let sim = SimulatedMediaElement::new();
    let controller = controller(&sim, DeviceProfile::interactive());
    controller.wait_for(is_playing).await.unwrap();

    // The reload consumes this script, so its play() is refused
    sim.push_scripts([AttemptScript::play_rejected("NotAllowedError")]);
    sim.simulate_stall(0.0);

    let view = controller.wait_for(|v| v.state == PlaybackState::Loading).await.unwrap();
    assert_eq!(view.retry_count, 0);

    controller.wait_for(is_playing).await.unwrap();
    assert_eq!(sim.loads(), 3);
    assert!(!sim.is_paused());
    assert!(controller
        .transitions()
        .await
        .contains(&(PlaybackState::Playing, PlaybackState::Loading)));
    assert!(controller.diagnostics().await.iter().any(|r| matches!(
        r.event,
        DiagnosticEvent::SelfHealFailed { action: SelfHealAction::Reload, .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_unrecoverable_stall_ends_in_error() {
    let sim = SimulatedMediaElement::with_scripts(vec![AttemptScript::healthy()])
        .with_fallback(AttemptScript::play_rejected("NotAllowedError"));
    let controller = controller(&sim, DeviceProfile::interactive());
    controller.wait_for(is_playing).await.unwrap();

    sim.simulate_stall(0.0);

    let view = controller.wait_for(is_error).await.unwrap();
    assert_eq!(view.retry_count, view.max_retries);
    assert!(sim.is_paused());
    // Initial load, the reload, then a fresh attempt plus three retries
    assert_eq!(sim.loads(), 6);
    assert_eq!(failure_codes(&controller).await.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_resume_that_never_settles_restarts_playback() {
    let sim = SimulatedMediaElement::new();
    let controller = controller(&sim, DeviceProfile::interactive());
    controller.wait_for(is_playing).await.unwrap();

    sim.set_play_script(PlayScript::Hang);
    sim.simulate_pause();

    // Still paused one resume delay after the self-heal
    tokio::time::sleep(Duration::from_millis(2100)).await;
    assert_eq!(controller.state(), PlaybackState::Loading);
    assert_eq!(controller.view().retry_count, 0);

    controller.wait_for(is_playing).await.unwrap();
}

// =============================================================================
// Manual Retry & Generations
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_is_noop_outside_error() {
    let sim = SimulatedMediaElement::with_scripts(vec![AttemptScript::silent()]);
    let controller = controller(&sim, DeviceProfile::interactive());

    assert!(!controller.retry());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(controller.view().generation, Generation(1));
    assert_eq!(sim.loads(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_retry_from_error_recovers() {
    let sim = SimulatedMediaElement::with_scripts(vec![AttemptScript::media_error("404"); 6]);
    let controller = controller(&sim, DeviceProfile::tv());
    controller.wait_for(is_error).await.unwrap();
    assert_eq!(sim.loads(), 6);

    assert!(controller.retry());
    let view = controller.wait_for(is_playing).await.unwrap();
    assert_eq!(view.retry_count, 0);
    assert!(view.last_error_message.is_none());
    assert_eq!(sim.loads(), 7);

    // Same path as a first-time success, entered from ERROR
    let transitions = controller.transitions().await;
    let from_error = transitions
        .iter()
        .rposition(|t| *t == (PlaybackState::Error, PlaybackState::Loading))
        .unwrap();
    assert_eq!(
        transitions[from_error..].to_vec(),
        vec![
            (PlaybackState::Error, PlaybackState::Loading),
            (PlaybackState::Loading, PlaybackState::Ready),
            (PlaybackState::Ready, PlaybackState::Playing),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_late_event_from_abandoned_attempt_is_dropped() {
    let mut profile = DeviceProfile::interactive();
    profile.max_retries = 1;
    profile.metadata_timeout_ms = 100_000;

    // The first attempt fails early but its metadata is still in flight until 60s
    let first = AttemptScript::media_error("network").with_event(60_000, MediaEvent::LoadedMetadata);
    let sim = SimulatedMediaElement::with_scripts(vec![
        first,
        AttemptScript::media_error("network"),
        AttemptScript::silent(),
    ]);
    let controller = controller(&sim, profile);

    controller.wait_for(is_error).await.unwrap();
    assert!(controller.retry());

    tokio::time::sleep(Duration::from_secs(65)).await;
    let view = controller.view();
    assert_eq!(view.state, PlaybackState::Loading);
    assert_eq!(view.generation, Generation(3));

    let dropped: Vec<_> = controller
        .diagnostics()
        .await
        .into_iter()
        .filter_map(|r| match r.event {
            DiagnosticEvent::StaleSignalDropped { signal_generation, signal } => Some((signal_generation, signal)),
            _ => None,
        })
        .collect();
    assert_eq!(dropped, vec![(Generation(1), "loadedmetadata".to_string())]);
}

// =============================================================================
// Element Contract
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_every_attempt_configures_before_loading() {
    let sim = SimulatedMediaElement::with_scripts(vec![AttemptScript::media_error("404")]);
    let controller = controller(&sim, DeviceProfile::interactive());
    controller.wait_for(is_playing).await.unwrap();

    let calls: Vec<_> = sim
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ElementCall::ApplyAttributes(_) | ElementCall::SetSource(_) | ElementCall::Load))
        .collect();
    assert_eq!(calls.len(), 6);
    for attempt in calls.chunks(3) {
        assert!(matches!(attempt[0], ElementCall::ApplyAttributes(_)));
        assert!(matches!(attempt[1], ElementCall::SetSource(_)));
        assert_eq!(attempt[2], ElementCall::Load);
    }
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_element() {
    let sim = SimulatedMediaElement::with_scripts(vec![AttemptScript::silent()]);
    let controller = controller(&sim, DeviceProfile::interactive());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sim.listener_count(), 1);

    controller.shutdown().await;
    assert_eq!(sim.listener_count(), 0);
    assert!(sim.source().is_none());
    assert!(sim.is_paused());

    // The metadata timer died with the controller
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sim.loads(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_set_source_after_playing() {
    let sim = SimulatedMediaElement::new();
    let controller = controller(&sim, DeviceProfile::interactive());
    controller.wait_for(is_playing).await.unwrap();
    let generation = controller.view().generation;

    controller.set_source("/videos/video4.mp4").unwrap();
    controller
        .wait_for(|v| v.generation > generation && v.state == PlaybackState::Playing)
        .await
        .unwrap();
    assert_eq!(sim.source().as_deref(), Some("/videos/video4.mp4"));
    assert_eq!(sim.loads(), 2);
}

// =============================================================================
// Profiling End To End
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_environment_drives_profile_and_source() {
    let env = Environment {
        user_agent: "Mozilla/5.0 (SMART-TV; Linux; Tizen 6.0) AppleWebKit/537.36".into(),
        viewport_width: 1920,
        viewport_height: 1080,
        touch_events: false,
        max_touch_points: 0,
        page_origin: Some("https://signage.example.com/lobby/".parse().unwrap()),
    };
    let sim = SimulatedMediaElement::new();
    let controller = PlaybackController::for_environment(
        Arc::new(sim.clone()),
        &env,
        ControllerConfig::default(),
        "/videos/video3.mp4",
    );

    assert!(controller.profile().is_tv());
    assert_eq!(controller.view().max_retries, 5);
    controller.wait_for(is_playing).await.unwrap();
    assert_eq!(
        sim.source().as_deref(),
        Some("https://signage.example.com/videos/video3.mp4")
    );
}

#[tokio::test(start_paused = true)]
async fn test_configured_tuning_applies() {
    let mut config = ControllerConfig::default();
    config.interactive = ProfileTuning {
        metadata_timeout_ms: 1_000,
        play_ready_timeout_ms: 1_000,
        max_retries: 1,
        warmup_delay_ms: 0,
    };
    let sim = SimulatedMediaElement::new().with_fallback(AttemptScript::silent());
    let controller = PlaybackController::for_environment(
        Arc::new(sim.clone()),
        &Environment::default(),
        config,
        "https://cdn.example.com/loop.mp4",
    );

    let view = controller.wait_for(is_error).await.unwrap();
    assert_eq!(view.max_retries, 1);
    assert_eq!(sim.loads(), 2);
}

// =============================================================================
// Scripted Runs
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_demo_script_recovers() {
    let scripts: Vec<AttemptScript> =
        serde_json::from_str(include_str!("../../../demos/flaky_autoplay.json")).unwrap();
    assert_eq!(scripts.len(), 3);

    let sim = SimulatedMediaElement::with_scripts(scripts);
    let controller = controller(&sim, DeviceProfile::interactive());

    controller.wait_for(is_playing).await.unwrap();
    assert_eq!(sim.loads(), 4);
    assert_eq!(
        failure_codes(&controller).await,
        vec!["PLAY_REJECTED", "MEDIA_ERROR", "METADATA_TIMEOUT"]
    );
}

#[test]
fn test_demo_config_parses() {
    let config = ControllerConfig::from_json_str(include_str!("../../../demos/fast_config.json")).unwrap();
    assert_eq!(config.backoff_ms, 500);
    assert_eq!(config.tv.warmup_delay_ms, 500);
    assert_eq!(config.resume_delay_ms, ControllerConfig::default().resume_delay_ms);
}
