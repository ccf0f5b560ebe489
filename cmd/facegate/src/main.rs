//! facegate CLI - face recognition check-in for a door camera.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{
    CheckInCommand, EnrollCommand, IdentitiesCommand, LogCommand, RebuildCommand, exit_code_for,
    print_error,
};

/// facegate CLI - face recognition check-in.
///
/// Enroll people from a few reference photos, then check a camera frame
/// against everyone enrolled. Every check-in is written to an audit log.
///
/// Configuration is read from ~/.facegate/config.yaml.
///
/// Exit codes: 0 granted/success, 1 denied, 2 invalid input, 3 no gallery
/// data, 4 embedder failure or no face, 5 timeout, 6 storage failure.
#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Face recognition check-in CLI")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.facegate/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enroll reference images for a person
    Enroll(EnrollCommand),
    /// Check a camera frame against the gallery
    #[command(name = "check-in")]
    CheckIn(CheckInCommand),
    /// Rebuild the embedding cache now
    Rebuild(RebuildCommand),
    /// List enrolled identities
    Identities(IdentitiesCommand),
    /// Show the check-in log, newest first
    Log(LogCommand),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Enroll(cmd) => cmd.run(&cli).await,
        Commands::CheckIn(cmd) => cmd.run(&cli).await,
        Commands::Rebuild(cmd) => cmd.run(&cli).await,
        Commands::Identities(cmd) => cmd.run(&cli).await,
        Commands::Log(cmd) => cmd.run(&cli).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            print_error(&format!("{e:#}"));
            ExitCode::from(exit_code_for(&e))
        }
    }
}
