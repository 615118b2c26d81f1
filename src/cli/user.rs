//! `cohorts user` commands
//!
//! # Usage
//! ```bash
//! cohorts user create 1000
//! cohorts user add 1000 AVITO_VOICE_MESSAGES,AVITO_DISCOUNT_30
//! cohorts user remove 1000 AVITO_DISCOUNT_30
//! cohorts user show 1000 --json
//! cohorts user delete 1000
//! ```
//!
//! `add` and `remove` skip slugs that name no segment and say so; they only
//! fail when none of the slugs exist.

use std::collections::BTreeSet;

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use super::utils::{parse_slugs, Workspace};
use crate::core::model::BatchOutcome;

#[derive(Args, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Register a user id
    Create { id: i64 },

    /// Delete a user that has no segments
    Delete { id: i64 },

    /// Show a user's segments
    Show {
        id: i64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add segments to a user
    Add(BatchArgs),

    /// Remove segments from a user
    Remove(BatchArgs),
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    pub id: i64,

    /// Segment slugs (space or comma separated)
    #[arg(required = true, value_delimiter = ',')]
    pub slugs: Vec<String>,

    /// Output the batch outcome as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: UserArgs, ws: &Workspace) -> Result<()> {
    let store = ws.open_store()?;

    match args.command {
        UserCommand::Create { id } => {
            store.create_user(id)?;
            println!("{} User created: {}", "✓".green(), id);
        }
        UserCommand::Delete { id } => {
            store.delete_user(id)?;
            println!("{} User deleted: {}", "✓".green(), id);
        }
        UserCommand::Show { id, json } => {
            let segments = store.get_segments(id)?;
            if json {
                let json = serde_json::json!({
                    "user_id": id,
                    "segments": segments,
                });
                println!("{}", serde_json::to_string_pretty(&json)?);
            } else {
                let user = store.user(id)?;
                println!("User {} (created {})", id.to_string().bold(), user.created_at.to_rfc3339());
                if segments.is_empty() {
                    println!("   No segments");
                }
                for slug in &segments {
                    println!("   {}", slug);
                }
            }
        }
        UserCommand::Add(batch) => {
            let outcome = store.add_memberships(batch.id, parse_slugs(&batch.slugs)?)?;
            report(&outcome, batch.id, "Added", batch.json)?;
        }
        UserCommand::Remove(batch) => {
            let outcome = store.remove_memberships(batch.id, parse_slugs(&batch.slugs)?)?;
            report(&outcome, batch.id, "Removed", batch.json)?;
        }
    }

    Ok(())
}

fn report(outcome: &BatchOutcome, id: i64, verb: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!(
        "{} {} {} segment(s) for user {}: {}",
        "✓".green(),
        verb,
        outcome.changed,
        id,
        join(&outcome.applied)
    );
    if !outcome.dropped.is_empty() {
        println!("{} Unknown segments skipped: {}", "⚠".yellow(), join(&outcome.dropped));
    }

    Ok(())
}

fn join(slugs: &BTreeSet<String>) -> String {
    slugs.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
