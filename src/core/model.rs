//! Model - Rows owned by the store
//!
//! Segments are keyed by slug, users by a caller-supplied integer id.
//! A membership is just the `(user_id, slug)` pair and has no type of its own
//! outside the ledger.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named cohort tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// A user known to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}

/// What a membership batch actually did.
///
/// Slugs naming missing segments are filtered out silently; they show up in
/// `dropped` for callers that want the diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Requested slugs that name existing segments
    pub applied: BTreeSet<String>,
    /// Requested slugs that name no segment
    pub dropped: BTreeSet<String>,
    /// Pairs inserted or deleted (already-present / already-absent pairs excluded)
    pub changed: usize,
}

/// What to do with memberships when one of their endpoints is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeletePolicy {
    /// Refuse the delete with `DependentRowsExist`
    #[default]
    Restrict,
    /// Remove the memberships in the same transaction
    Cascade,
}

impl std::fmt::Display for DeletePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeletePolicy::Restrict => write!(f, "restrict"),
            DeletePolicy::Cascade => write!(f, "cascade"),
        }
    }
}

impl std::str::FromStr for DeletePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "restrict" => Ok(DeletePolicy::Restrict),
            "cascade" => Ok(DeletePolicy::Cascade),
            _ => anyhow::bail!("Unknown delete policy: {}", s),
        }
    }
}

/// Row counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub segments: u64,
    pub users: u64,
    pub memberships: u64,
}
