//! CLI module - Command definitions and handlers

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::core::model::DeletePolicy;

pub mod init;
pub mod segment;
pub mod stats;
pub mod user;
pub mod utils;

/// cohorts - User segment membership store
///
/// Register segments and users, then assign users to segments in batches.
#[derive(Parser, Debug)]
#[command(name = "cohorts")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, env = "COHORTS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file (overrides config and COHORTS_DATABASE)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Override the configured delete policy (restrict or cascade)
    #[arg(long, global = true)]
    pub delete_policy: Option<DeletePolicy>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new cohorts directory
    Init(init::InitArgs),

    /// Create, delete and inspect segments
    Segment(segment::SegmentArgs),

    /// Create, delete and inspect users and their segments
    User(user::UserArgs),

    /// Show row counts
    Stats(stats::StatsArgs),
}
