//! ITE-10 verifier CLI.
//!
//! Verify software supply chain attestations against an in-toto layout,
//! optionally pulling provenance from a GUAC graph.

mod commands;
mod config;
mod loader;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;

use crate::config::CliConfig;

/// ITE-10 verifier: check attestations against a layout of expected steps,
/// subjects, and inspections.
#[derive(Parser)]
#[command(name = "ite10-verifier", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (repeat for more detail: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output logs as JSON (for machine consumption).
    #[arg(long, global = true)]
    json_logs: bool,

    /// Configuration file (defaults to the platform config directory).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Verify attestations against a layout.
    Verify(commands::verify::VerifyArgs),
    /// List provenance the graph holds for a package URL.
    Discover(commands::discover::DiscoverArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if cli.json_logs || config.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Verify(args) => commands::verify::execute(args, &config).await,
        Commands::Discover(args) => commands::discover::execute(args, &config).await,
    }
}
