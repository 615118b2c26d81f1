//! CLI utility functions
//!
//! Shared by every command that touches the store:
//! - Resolving the database path and opening the store
//! - Normalizing slug arguments

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::core::model::DeletePolicy;
use crate::core::store::Store;

/// Resolved settings for one command invocation
#[derive(Debug, Clone)]
pub struct Workspace {
    pub config: Config,
    pub db_path: PathBuf,
}

impl Workspace {
    /// `db` and `delete_policy` come from the command line and win over config
    pub fn new(mut config: Config, db: Option<PathBuf>, delete_policy: Option<DeletePolicy>) -> Self {
        if let Some(policy) = delete_policy {
            config.membership.delete_policy = policy;
        }
        let db_path = db.unwrap_or_else(|| config.database_path());
        Self { config, db_path }
    }

    /// Open the store, creating the database and its parent directory if needed
    pub fn open_store(&self) -> Result<Store> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        Store::open(
            &self.db_path,
            &self.config.database,
            self.config.membership.delete_policy,
        )
        .with_context(|| format!("Failed to open database {}", self.db_path.display()))
    }
}

/// Trim a slug and reject empty ones
pub fn parse_slug(raw: &str) -> Result<String> {
    let slug = raw.trim();
    if slug.is_empty() {
        bail!("Segment slug cannot be empty");
    }
    Ok(slug.to_string())
}

/// Normalize a list of slugs (already split on commas by clap)
pub fn parse_slugs(raw: &[String]) -> Result<Vec<String>> {
    if raw.is_empty() {
        bail!("At least one segment slug is required");
    }
    raw.iter().map(|s| parse_slug(s)).collect()
}
