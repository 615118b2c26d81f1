//! Query facade - read path
//!
//! Reads run in a deferred transaction so the existence check and the
//! membership read see the same snapshot.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::database::Database;
use super::error::{EntityRef, StoreError, StoreResult};
use super::model::{Segment, StoreStats, User};
use super::registry::{find_segment, find_user, parse_timestamp, user_exists};

/// Read-only view over segments, users and memberships
#[derive(Clone)]
pub struct QueryFacade {
    db: Arc<Database>,
}

impl QueryFacade {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Segments a user currently belongs to
    pub fn get_segments(&self, user_id: i64) -> StoreResult<BTreeSet<String>> {
        let mut conn = self.db.connection()?;
        let tx = conn.transaction()?;

        if !user_exists(&tx, user_id)? {
            return Err(StoreError::UserNotFound { id: user_id });
        }

        let segments = {
            let mut stmt = tx.prepare("SELECT slug FROM user_segments WHERE user_id = ?1")?;
            let rows = stmt.query_map([user_id], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<BTreeSet<_>, _>>()?
        };
        tx.commit()?;

        debug!(user_id, count = segments.len(), "segments fetched");
        Ok(segments)
    }

    /// Get a segment by slug
    pub fn segment(&self, slug: &str) -> StoreResult<Segment> {
        let conn = self.db.connection()?;
        find_segment(&conn, slug)?.ok_or_else(|| StoreError::NotFound {
            entity: EntityRef::segment(slug),
        })
    }

    /// Get a user by id
    pub fn user(&self, id: i64) -> StoreResult<User> {
        let conn = self.db.connection()?;
        find_user(&conn, id)?.ok_or_else(|| StoreError::NotFound {
            entity: EntityRef::user(id),
        })
    }

    /// All segments, ordered by slug
    pub fn list_segments(&self) -> StoreResult<Vec<Segment>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare("SELECT slug, created_at FROM segments ORDER BY slug")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(slug, created)| {
                Ok(Segment {
                    slug,
                    created_at: parse_timestamp(&created)?,
                })
            })
            .collect()
    }

    /// Row counts for all three tables
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.db.connection()?;

        let count = |table: &str| -> StoreResult<u64> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
            Ok(n as u64)
        };

        Ok(StoreStats {
            segments: count("segments")?,
            users: count("users")?,
            memberships: count("user_segments")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::MembershipLedger;
    use crate::core::model::DeletePolicy;
    use crate::core::registry::EntityRegistry;

    fn setup() -> StoreResult<(EntityRegistry, MembershipLedger, QueryFacade)> {
        let db = Arc::new(Database::open_memory()?);
        Ok((
            EntityRegistry::new(db.clone(), DeletePolicy::Restrict),
            MembershipLedger::new(db.clone()),
            QueryFacade::new(db),
        ))
    }

    #[test]
    fn test_new_user_has_no_segments() -> anyhow::Result<()> {
        let (registry, _, query) = setup()?;
        registry.create_user(1000)?;

        assert!(query.get_segments(1000)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_unknown_user() -> anyhow::Result<()> {
        let (_, _, query) = setup()?;

        assert!(matches!(
            query.get_segments(1),
            Err(StoreError::UserNotFound { id: 1 })
        ));
        assert!(matches!(
            query.user(1),
            Err(StoreError::NotFound { entity: EntityRef::User(1) })
        ));
        Ok(())
    }

    #[test]
    fn test_segments_follow_ledger() -> anyhow::Result<()> {
        let (registry, ledger, query) = setup()?;
        registry.create_user(1)?;
        for slug in ["AVITO_VOICE_MESSAGES", "AVITO_DISCOUNT_30", "AVITO_DISCOUNT_50"] {
            registry.create_segment(slug)?;
        }

        ledger.add_memberships(1, ["AVITO_VOICE_MESSAGES", "AVITO_DISCOUNT_30"])?;
        ledger.remove_memberships(1, ["AVITO_VOICE_MESSAGES"])?;

        let segments = query.get_segments(1)?;
        assert_eq!(segments, BTreeSet::from(["AVITO_DISCOUNT_30".to_string()]));
        Ok(())
    }

    #[test]
    fn test_list_and_stats() -> anyhow::Result<()> {
        let (registry, ledger, query) = setup()?;
        registry.create_segment("b")?;
        let a = registry.create_segment("a")?;
        registry.create_user(1)?;
        registry.create_user(2)?;
        ledger.add_memberships(1, ["a", "b"])?;

        let listed = query.list_segments()?;
        assert_eq!(
            listed.iter().map(|s| s.slug.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        assert_eq!(query.segment("a")?, a);

        assert_eq!(
            query.stats()?,
            StoreStats {
                segments: 2,
                users: 2,
                memberships: 2,
            }
        );
        Ok(())
    }
}
