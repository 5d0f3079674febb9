//! beatsync CLI
//!
//! Compiles beat-synced edit plans and render jobs from the command line.
//! JSON results go to stdout, logs and status lines to stderr.

mod commands;
mod output;

use std::path::PathBuf;

use anyhow::{Context, Result};
use beatsync::BeatSyncConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{PlanArgs, RenderArgs};
use crate::output::OutputHandler;

/// Beat-synced timeline compiler
#[derive(Parser)]
#[command(name = "beatsync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Compile beat-synced edit plans and render jobs")]
#[command(long_about = r#"
Compiles a music tempo estimate and a set of selected effects into a gapless,
beat-aligned edit plan and the ffmpeg filter graph that renders it.

Examples:
  beatsync plan --style flashy --clips 3 --effect zoom --effect shake
  beatsync plan --request request.json --offline > plan.json
  beatsync render-spec --plan plan.json --clip a.mp4 --clip b.mp4 --music song.mp3
  beatsync filter shake-heavy --intensity 8 --duration 0.5
  beatsync config --set estimator.model=gpt-4o
"#)]
struct Cli {
    /// Config file (defaults to ~/.beatsync/config.toml)
    #[arg(short, long, env = "BEATSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve an edit plan for a request
    Plan {
        /// Read the PlanRequest JSON from a file ("-" for stdin)
        #[arg(short, long, conflicts_with_all = ["style", "clips", "effects"])]
        request: Option<PathBuf>,

        /// Template style
        #[arg(short, long, default_value = "flashy")]
        style: String,

        /// Music duration in seconds
        #[arg(short, long, default_value = "15")]
        duration: f64,

        /// Number of source clips
        #[arg(long, default_value = "1")]
        clips: usize,

        /// Selected effect (repeatable)
        #[arg(short, long = "effect", default_value = "zoom")]
        effects: Vec<String>,

        /// Skip the estimator and compile at this tempo
        #[arg(long)]
        bpm: Option<f64>,

        /// Seed for effect intensities
        #[arg(long)]
        seed: Option<u64>,

        /// Never call the estimator; use the style table
        #[arg(long)]
        offline: bool,

        /// Override the estimator model
        #[arg(long)]
        model: Option<String>,

        /// Override the estimator endpoint
        #[arg(long)]
        endpoint: Option<String>,
    },

    /// Build the render job for a saved plan
    RenderSpec {
        /// Plan JSON file ("-" for stdin)
        #[arg(short, long)]
        plan: PathBuf,

        /// Clip URL in upload order (repeatable)
        #[arg(long = "clip", required = true)]
        clips: Vec<String>,

        /// Music URL
        #[arg(short, long)]
        music: Option<String>,

        /// Only apply these effects (repeatable; all when omitted)
        #[arg(short, long = "effect")]
        effects: Vec<String>,

        /// Print the ffmpeg command for this output file instead of the render spec
        #[arg(long)]
        ffmpeg: Option<String>,
    },

    /// Show the filter for a single effect trigger
    Filter {
        /// Effect name
        effect: String,

        /// Intensity 1-10
        #[arg(short, long, default_value = "8")]
        intensity: u8,

        /// Segment duration in seconds
        #[arg(short, long, default_value = "0.5")]
        duration: f64,
    },

    /// Show or edit the configuration
    Config {
        /// Print one value by key path
        #[arg(long)]
        get: Option<String>,

        /// Set a configuration value (key=value)
        #[arg(long)]
        set: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays valid JSON
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    format!("beatsync={0},beatsync_cli={0},warn", log_level).into()
                }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config_path = cli.config.clone().unwrap_or_else(BeatSyncConfig::config_path);
    let mut config = match &cli.config {
        Some(path) => {
            dotenv::dotenv().ok();
            BeatSyncConfig::load_from(path)
                .with_context(|| format!("Failed to load {}", path.display()))?
        }
        None => BeatSyncConfig::load().context("Failed to load configuration")?,
    };
    tracing::debug!("Using config {}", config_path.display());
    let output = OutputHandler::new(cli.pretty);

    match cli.command {
        Commands::Plan {
            request,
            style,
            duration,
            clips,
            effects,
            bpm,
            seed,
            offline,
            model,
            endpoint,
        } => {
            if let Some(model) = model {
                config.estimator.model = model;
            }
            if let Some(endpoint) = endpoint {
                config.estimator.endpoint = endpoint;
            }
            let args = PlanArgs {
                request,
                style,
                duration,
                clips,
                effects,
                bpm,
                seed,
                offline,
            };
            commands::plan(&config, args, &output).await?;
        }
        Commands::RenderSpec {
            plan,
            clips,
            music,
            effects,
            ffmpeg,
        } => {
            let args = RenderArgs {
                plan,
                clips,
                music,
                effects,
                ffmpeg_output: ffmpeg,
            };
            commands::render_spec(&config, args, &output)?;
        }
        Commands::Filter {
            effect,
            intensity,
            duration,
        } => {
            commands::filter(&config, &effect, intensity, duration, &output)?;
        }
        Commands::Config { get, set } => {
            if let Some(kv) = set {
                commands::set_config(&config, &config_path, &kv, &output)?;
            } else if let Some(key) = get {
                commands::get_config(&config, &key, &output)?;
            } else {
                commands::show_config(&config, &config_path, &output)?;
            }
        }
    }

    Ok(())
}
