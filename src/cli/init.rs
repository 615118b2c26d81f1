//! `cohorts init` command
//!
//! Creates a `.cohorts/` directory with a default config and an empty
//! database.
//!
//! # Usage
//! ```bash
//! cohorts init                    # Initialize in current directory
//! cohorts init /path/to/project   # Initialize in specific path
//! ```

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

use crate::config::{Config, LOCAL_DIR};
use crate::core::store::Store;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path to initialize (default: current directory)
    pub path: Option<PathBuf>,

    /// Force re-initialization (keeps existing data)
    #[arg(short, long)]
    pub force: bool,
}

pub fn run(args: InitArgs) -> Result<()> {
    let base_path = args.path.unwrap_or_else(|| PathBuf::from("."));
    let local_dir = base_path.join(LOCAL_DIR);

    if local_dir.exists() && !args.force {
        bail!(
            "Directory {} is already initialized. Use --force to reinitialize.",
            base_path.display()
        );
    }

    fs::create_dir_all(&local_dir)?;

    let config = Config::default();
    let config_path = local_dir.join("config.toml");
    config.save_to(&config_path)?;

    // Opening the store creates the schema
    let db_path = local_dir.join("data.db");
    Store::open(&db_path, &config.database, config.membership.delete_policy)?;

    println!("{} Initialized cohorts in {}", "✓".green(), base_path.display());
    println!("   Config: {}", config_path.display());
    println!("   Database: {}", db_path.display());
    println!("\nNext steps:");
    println!("  cohorts segment create AVITO_VOICE_MESSAGES");
    println!("  cohorts user create 1000");
    println!("  cohorts user add 1000 AVITO_VOICE_MESSAGES");

    Ok(())
}
