//! Output formatting for CLI

use console::style;
use tabled::{Table, Tabled};
use vigil_core::{DeviceClass, DiagnosticEvent, DiagnosticRecord, Overlay, PlaybackState, PlaybackView};

/// Output format options
pub enum OutputFormat {
    Text,
    Json,
    Table,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Text,
        }
    }
}

pub fn style_class(class: DeviceClass) -> String {
    match class {
        DeviceClass::TvClass => style(class).magenta().to_string(),
        DeviceClass::Interactive => style(class).cyan().to_string(),
    }
}

fn style_state(state: PlaybackState) -> String {
    match state {
        PlaybackState::Loading | PlaybackState::Ready => style(state).yellow().to_string(),
        PlaybackState::Playing => style(state).green().to_string(),
        PlaybackState::Error => style(state).red().bold().to_string(),
    }
}

/// One line per observed view
pub fn view_line(view: &PlaybackView, overlay: &Overlay) -> String {
    format!(
        "[gen {}] {:<8} retries {}/{}  overlay: {}",
        view.generation,
        style_state(view.state),
        view.retry_count,
        view.max_retries,
        overlay
    )
}

fn describe(event: &DiagnosticEvent) -> String {
    match event {
        DiagnosticEvent::AttemptStarted { source } => format!("attempt started: {}", source),
        DiagnosticEvent::StateChange { from, to } => format!("{} -> {}", from, to),
        DiagnosticEvent::Failure { code, message } => format!("failure {}: {}", code, message),
        DiagnosticEvent::RetryScheduled { delay_ms } => format!("retry in {}ms", delay_ms),
        DiagnosticEvent::SelfHeal { action } => format!("self-heal: {:?}", action),
        DiagnosticEvent::SelfHealFailed { action, reason } => format!("self-heal {:?} failed: {}", action, reason),
        DiagnosticEvent::StaleSignalDropped { signal_generation, signal } => {
            format!("dropped {} from gen {}", signal, signal_generation)
        }
        DiagnosticEvent::ManualRetry => "manual retry".to_string(),
        DiagnosticEvent::SourceChanged { source } => format!("source changed: {}", source),
        DiagnosticEvent::Teardown => "teardown".to_string(),
    }
}

pub fn record_line(record: &DiagnosticRecord) -> String {
    format!(
        "#{:<3} {} gen {} retry {}  {}",
        record.sequence,
        record.timestamp.format("%H:%M:%S%.3f"),
        record.context.generation,
        record.context.retry_count,
        describe(&record.event)
    )
}

#[derive(Tabled)]
struct DiagnosticRow {
    #[tabled(rename = "#")]
    sequence: u64,
    time: String,
    generation: u64,
    retries: u32,
    event: String,
}

pub fn diagnostics_table(records: &[DiagnosticRecord]) -> String {
    let rows = records.iter().map(|r| DiagnosticRow {
        sequence: r.sequence,
        time: r.timestamp.format("%H:%M:%S%.3f").to_string(),
        generation: r.context.generation.0,
        retries: r.context.retry_count,
        event: describe(&r.event),
    });
    Table::new(rows).to_string()
}
