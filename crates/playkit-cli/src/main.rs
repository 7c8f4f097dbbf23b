//! Playkit CLI - Headless Embed Runner
//!
//! Features:
//! - Configuration validation with every violation listed
//! - Backend detection for a media URL
//! - Simulated playback sessions on the headless platform

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// Playkit CLI - Embeddable player toolkit
#[derive(Parser)]
#[command(name = "playkit")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Validate player embeds and simulate playback headlessly", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an embed configuration file
    Validate {
        /// Path to a JSON configuration
        config: PathBuf,
    },

    /// Show which backend would play a URL
    Detect {
        /// Media URL
        url: String,

        /// Explicit type (video, audio, hls, dash)
        #[arg(short = 't', long = "type")]
        media_type: Option<String>,

        /// Preferred backend when no type is given
        #[arg(short, long)]
        priority: Option<String>,
    },

    /// Run a simulated playback session
    Play {
        /// Path to a JSON configuration
        config: PathBuf,

        /// Simulated media duration in seconds
        #[arg(long, default_value = "30")]
        media_duration: f64,

        /// Maximum simulated session length in seconds
        #[arg(short, long, default_value = "120")]
        duration: f64,

        /// Simulated seconds per clock step
        #[arg(long, default_value = "1")]
        step: f64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    playkit_core::init();

    match cli.command {
        Commands::Validate { config } => {
            commands::validate(&config, &cli.format)?;
        }
        Commands::Detect { url, media_type, priority } => {
            commands::detect(&url, media_type.as_deref(), priority.as_deref(), &cli.format)?;
        }
        Commands::Play { config, media_duration, duration, step } => {
            commands::play(&config, media_duration, duration, step, &cli.format).await?;
        }
    }

    Ok(())
}
