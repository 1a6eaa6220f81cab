//! Presenter CLI — record, inspect, and validate presenter sessions.
//!
//! Usage:
//!   presenter record [OPTIONS]     Record until Ctrl+C or --duration
//!   presenter check                Show displays, devices and permissions
//!   presenter validate <DIR>       Validate a session directory

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use presenter_common::config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "presenter",
    about = "Record screen, webcam, microphone and input as separate tracks",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a session
    Record {
        /// Root directory for session directories
        #[arg(short, long)]
        recordings_dir: Option<PathBuf>,

        /// Stop automatically after this many seconds
        #[arg(short, long)]
        duration: Option<f64>,
    },

    /// Check displays, capture devices and permissions
    Check,

    /// Validate a recorded session directory
    Validate {
        /// Path to the session directory
        path: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    if cli.json_logs {
        config.logging.json = true;
    }
    presenter_common::logging::init_logging(&config.logging);
    tracing::debug!(
        path = %presenter_common::config::config_file_path().display(),
        recordings_dir = %config.recordings_dir.display(),
        "Configuration loaded"
    );

    match cli.command {
        Commands::Record {
            recordings_dir,
            duration,
        } => {
            if let Some(dir) = recordings_dir {
                config.recordings_dir = dir;
            }
            commands::record::run(config, duration).await
        }
        Commands::Check => commands::check::run(),
        Commands::Validate { path, json } => commands::validate::run(path, json),
    }
}
