//! CLI command implementations

use crate::output::{self, OutputFormat};
use crate::EnvironmentArgs;
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use vigil_core::{
    AttemptScript, ControllerConfig, DeviceProfiler, Environment, Overlay, PlaybackController, PlaybackState,
    SimulatedMediaElement,
};

impl EnvironmentArgs {
    fn to_environment(&self) -> Environment {
        Environment {
            user_agent: self.user_agent.clone(),
            viewport_width: self.width,
            viewport_height: self.height,
            touch_events: self.touch,
            max_touch_points: self.max_touch_points,
            page_origin: self.origin.clone(),
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ControllerConfig> {
    match path {
        Some(path) => {
            let config = ControllerConfig::from_json_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?;
            debug!(path = %path.display(), backoff_ms = config.backoff_ms, "Configuration loaded");
            Ok(config)
        }
        None => Ok(ControllerConfig::default()),
    }
}

fn load_scripts(path: Option<&Path>) -> anyhow::Result<Vec<AttemptScript>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let json = std::fs::read_to_string(path).with_context(|| format!("reading script {}", path.display()))?;
    let scripts: Vec<AttemptScript> =
        serde_json::from_str(&json).with_context(|| format!("parsing script {}", path.display()))?;
    debug!(attempts = scripts.len(), "Attempt scripts loaded");
    Ok(scripts)
}

/// Classify an environment
pub fn classify(env: &EnvironmentArgs, config: Option<&Path>, format: &str) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let profile = DeviceProfiler::with_config(&config).classify(&env.to_environment());

    match OutputFormat::from(format) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&profile)?),
        OutputFormat::Table | OutputFormat::Text => {
            println!("Device Profile:");
            println!("  Class: {}", output::style_class(profile.classification));
            println!("  Reason: {:?}", profile.reason);
            println!("  Metadata timeout: {}ms", profile.metadata_timeout_ms);
            println!("  Ready timeout: {}ms", profile.play_ready_timeout_ms);
            println!("  Max retries: {}", profile.max_retries);
            println!("  Preload: {}", profile.preload_strategy.attribute_value());
            println!("  Absolute URLs: {}", profile.requires_absolute_url);
            println!("  Warmup: {}ms", profile.warmup_delay_ms);
        }
    }

    Ok(())
}

/// Run one controller against a scripted element until it settles
pub async fn simulate(
    source: &str,
    env: &EnvironmentArgs,
    config: Option<&Path>,
    script: Option<&Path>,
    manual_retry: bool,
    format: &str,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let scripts = load_scripts(script)?;
    let format = OutputFormat::from(format);

    let sim = SimulatedMediaElement::with_scripts(scripts);
    let controller = PlaybackController::for_environment(Arc::new(sim.clone()), &env.to_environment(), config, source);

    if !matches!(format, OutputFormat::Json) {
        println!(
            "Simulating {} on {} (max {} retries)",
            source,
            output::style_class(controller.profile().classification),
            controller.profile().max_retries
        );
    }

    let mut views = controller.subscribe();
    let mut retried = false;
    loop {
        let view = views.borrow_and_update().clone();
        if !matches!(format, OutputFormat::Json) {
            println!("  {}", output::view_line(&view, &Overlay::for_view(&view)));
        }

        match view.state {
            PlaybackState::Playing => break,
            PlaybackState::Error if manual_retry && !retried => {
                retried = true;
                if !controller.retry() {
                    break;
                }
            }
            PlaybackState::Error => break,
            _ => {}
        }

        views.changed().await.context("controller stopped")?;
    }

    let records = controller.diagnostics().await;
    let final_view = controller.view();
    controller.shutdown().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Table => println!("\n{}", output::diagnostics_table(&records)),
        OutputFormat::Text => {
            println!("\nDiagnostics:");
            for record in &records {
                println!("  {}", output::record_line(record));
            }
            println!("\nLoads: {}, play() calls: {}", sim.loads(), sim.play_calls());
        }
    }

    if final_view.state == PlaybackState::Error {
        std::process::exit(1);
    }

    Ok(())
}

/// Print the default configuration
pub fn show_config() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&ControllerConfig::default())?);
    Ok(())
}
