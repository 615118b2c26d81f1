//! `cohorts segment` commands
//!
//! # Usage
//! ```bash
//! cohorts segment create AVITO_VOICE_MESSAGES
//! cohorts segment delete AVITO_VOICE_MESSAGES
//! cohorts segment show AVITO_VOICE_MESSAGES --json
//! cohorts segment list
//! ```

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{Table, Tabled};

use super::utils::{parse_slug, Workspace};
use crate::core::model::Segment;

#[derive(Args, Debug)]
pub struct SegmentArgs {
    #[command(subcommand)]
    pub command: SegmentCommand,
}

#[derive(Subcommand, Debug)]
pub enum SegmentCommand {
    /// Register a new segment
    Create {
        /// Segment slug (e.g. AVITO_VOICE_MESSAGES)
        slug: String,
    },

    /// Delete a segment that no user belongs to
    Delete { slug: String },

    /// Show one segment
    Show {
        slug: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List all segments
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Tabled)]
struct SegmentRow {
    #[tabled(rename = "Slug")]
    slug: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

impl From<&Segment> for SegmentRow {
    fn from(segment: &Segment) -> Self {
        Self {
            slug: segment.slug.clone(),
            created_at: segment.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub fn run(args: SegmentArgs, ws: &Workspace) -> Result<()> {
    let store = ws.open_store()?;

    match args.command {
        SegmentCommand::Create { slug } => {
            let segment = store.create_segment(&parse_slug(&slug)?)?;
            println!("{} Segment created: {}", "✓".green(), segment.slug);
        }
        SegmentCommand::Delete { slug } => {
            let slug = parse_slug(&slug)?;
            store.delete_segment(&slug)?;
            println!("{} Segment deleted: {}", "✓".green(), slug);
        }
        SegmentCommand::Show { slug, json } => {
            let segment = store.segment(&parse_slug(&slug)?)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&segment)?);
            } else {
                println!("{}", segment.slug.bold());
                println!("   Created: {}", segment.created_at.to_rfc3339());
            }
        }
        SegmentCommand::List { json } => {
            let segments = store.list_segments()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&segments)?);
            } else if segments.is_empty() {
                println!("No segments");
            } else {
                let rows: Vec<SegmentRow> = segments.iter().map(SegmentRow::from).collect();
                println!("{}", Table::new(rows));
            }
        }
    }

    Ok(())
}
