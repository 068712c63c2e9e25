//! Vigil CLI - Headless Playback Recovery Tool
//!
//! Features:
//! - Device classification from user agent and viewport
//! - Scripted playback runs against a simulated media element
//! - Default configuration dump

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use url::Url;

mod commands;
mod output;

/// Vigil CLI - Signage playback toolkit
#[derive(Parser)]
#[command(name = "vigil-cli")]
#[command(author = "Cortel")]
#[command(version)]
#[command(about = "Device classification and playback recovery simulation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json, table)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

/// Host environment as seen by the profiler
#[derive(Args, Debug, Clone)]
pub struct EnvironmentArgs {
    /// User-agent string
    #[arg(short, long, default_value = "")]
    user_agent: String,

    /// Viewport width in CSS pixels
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Viewport height in CSS pixels
    #[arg(long, default_value = "720")]
    height: u32,

    /// Touch events are supported
    #[arg(long)]
    touch: bool,

    /// Maximum simultaneous touch points
    #[arg(long, default_value = "0")]
    max_touch_points: u32,

    /// Origin of the hosting page
    #[arg(long)]
    origin: Option<Url>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an environment and print the resulting profile
    Classify {
        #[command(flatten)]
        env: EnvironmentArgs,

        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run a controller against a scripted media element
    Simulate {
        /// Video source
        source: String,

        #[command(flatten)]
        env: EnvironmentArgs,

        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Per-attempt element behaviour (JSON list); healthy attempts when omitted
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Ask for one manual retry if the run ends in ERROR
        #[arg(long)]
        manual_retry: bool,
    },

    /// Print the default configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    vigil_core::init();

    match cli.command {
        Commands::Classify { env, config } => {
            commands::classify(&env, config.as_deref(), &cli.format)?;
        }
        Commands::Simulate { source, env, config, script, manual_retry } => {
            commands::simulate(&source, &env, config.as_deref(), script.as_deref(), manual_retry, &cli.format)
                .await?;
        }
        Commands::Config => {
            commands::show_config()?;
        }
    }

    Ok(())
}
