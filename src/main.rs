//! cohorts CLI - Entry point
//!
//! Usage: cohorts <command> [options]

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cohorts::cli::utils::Workspace;
use cohorts::cli::{Cli, Commands};
use cohorts::config::Config;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter(&config, cli.verbose))
        .init();

    let ws = Workspace::new(config, cli.db, cli.delete_policy);
    tracing::debug!(db = %ws.db_path.display(), "using database");

    match cli.command {
        Commands::Init(args) => cohorts::cli::init::run(args),
        Commands::Segment(args) => cohorts::cli::segment::run(args, &ws),
        Commands::User(args) => cohorts::cli::user::run(args, &ws),
        Commands::Stats(args) => cohorts::cli::stats::execute(args, &ws),
    }
}

/// `--verbose` beats RUST_LOG, which beats the config file
fn env_filter(config: &Config, verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new("debug");
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter))
}
