//! Membership ledger - the `user_segments` relation
//!
//! Adds and removes `(user, segment)` pairs in batches.
//!
//! # Batch rules
//! - Unknown user: the whole batch fails with `UserNotFound`
//! - Slugs naming missing segments are dropped from the batch, not reported
//! - Nothing left after dropping: `NoValidSegments`
//! - Pairs already present (add) or already absent (remove) are skipped
//!
//! The checks and the per-pair statements share one `BEGIN IMMEDIATE`
//! transaction, so a failed batch leaves nothing behind.

use std::collections::BTreeSet;
use std::sync::Arc;

use rusqlite::{params, Connection, TransactionBehavior};
use tracing::{debug, info};

use super::database::Database;
use super::error::{is_unique_violation, StoreError, StoreResult};
use super::model::BatchOutcome;
use super::registry::{segment_exists, user_exists};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchOp {
    Add,
    Remove,
}

/// Owns the user ↔ segment relation
#[derive(Clone)]
pub struct MembershipLedger {
    db: Arc<Database>,
}

impl MembershipLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Assign segments to a user
    pub fn add_memberships<I, S>(&self, user_id: i64, slugs: I) -> StoreResult<BatchOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(BatchOp::Add, user_id, slugs.into_iter().map(Into::into).collect())
    }

    /// Take segments away from a user
    pub fn remove_memberships<I, S>(&self, user_id: i64, slugs: I) -> StoreResult<BatchOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.apply(BatchOp::Remove, user_id, slugs.into_iter().map(Into::into).collect())
    }

    fn apply(
        &self,
        op: BatchOp,
        user_id: i64,
        requested: BTreeSet<String>,
    ) -> StoreResult<BatchOutcome> {
        let mut conn = self.db.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if !user_exists(&tx, user_id)? {
            return Err(StoreError::UserNotFound { id: user_id });
        }

        let (applied, dropped) = partition_existing(&tx, requested)?;
        if !dropped.is_empty() {
            debug!(user_id, ?dropped, "dropping unknown segments from batch");
        }
        if applied.is_empty() {
            return Err(StoreError::NoValidSegments { user_id });
        }

        let changed = match op {
            BatchOp::Add => insert_pairs(&tx, user_id, &applied)?,
            BatchOp::Remove => delete_pairs(&tx, user_id, &applied)?,
        };
        tx.commit()?;

        info!(user_id, ?op, requested = applied.len(), changed, "membership batch applied");
        Ok(BatchOutcome {
            applied,
            dropped,
            changed,
        })
    }
}

/// Split slugs into (existing segments, unknown slugs)
fn partition_existing(
    conn: &Connection,
    requested: BTreeSet<String>,
) -> StoreResult<(BTreeSet<String>, BTreeSet<String>)> {
    let mut existing = BTreeSet::new();
    let mut missing = BTreeSet::new();

    for slug in requested {
        if segment_exists(conn, &slug)? {
            existing.insert(slug);
        } else {
            missing.insert(slug);
        }
    }

    Ok((existing, missing))
}

fn insert_pairs(conn: &Connection, user_id: i64, slugs: &BTreeSet<String>) -> StoreResult<usize> {
    let mut stmt = conn.prepare("INSERT INTO user_segments (user_id, slug) VALUES (?1, ?2)")?;
    let mut inserted = 0;

    for slug in slugs {
        match stmt.execute(params![user_id, slug]) {
            Ok(n) => inserted += n,
            // Already a member
            Err(e) if is_unique_violation(&e) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(inserted)
}

fn delete_pairs(conn: &Connection, user_id: i64, slugs: &BTreeSet<String>) -> StoreResult<usize> {
    let mut stmt = conn.prepare("DELETE FROM user_segments WHERE user_id = ?1 AND slug = ?2")?;
    let mut deleted = 0;

    for slug in slugs {
        deleted += stmt.execute(params![user_id, slug])?;
    }

    Ok(deleted)
}
