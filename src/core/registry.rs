//! Entity registry - segments and users
//!
//! Owns the `segments` and `users` tables. Creates and deletes run inside a
//! single `BEGIN IMMEDIATE` transaction: the existence pre-check gives a
//! descriptive error, the table constraints decide the outcome when two
//! writers race.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, ToSql, TransactionBehavior};
use tracing::{debug, info, warn};

use super::database::Database;
use super::error::{is_foreign_key_violation, is_unique_violation, EntityRef, StoreError, StoreResult};
use super::model::{DeletePolicy, Segment, User};

/// Table layout of one registry-owned entity
struct EntityTable {
    table: &'static str,
    key: &'static str,
    /// Column in `user_segments` referencing this table
    membership_key: &'static str,
}

const SEGMENTS: EntityTable = EntityTable {
    table: "segments",
    key: "slug",
    membership_key: "slug",
};

const USERS: EntityTable = EntityTable {
    table: "users",
    key: "id",
    membership_key: "user_id",
};

/// Creates and deletes segments and users
#[derive(Clone)]
pub struct EntityRegistry {
    db: Arc<Database>,
    delete_policy: DeletePolicy,
}

impl EntityRegistry {
    pub fn new(db: Arc<Database>, delete_policy: DeletePolicy) -> Self {
        Self { db, delete_policy }
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    /// Register a new segment
    pub fn create_segment(&self, slug: &str) -> StoreResult<Segment> {
        let created_at = self.create(&SEGMENTS, &slug, EntityRef::segment(slug))?;
        info!(slug, "segment created");
        Ok(Segment {
            slug: slug.to_string(),
            created_at,
        })
    }

    /// Delete a segment
    pub fn delete_segment(&self, slug: &str) -> StoreResult<()> {
        self.delete(&SEGMENTS, &slug, EntityRef::segment(slug))?;
        info!(slug, "segment deleted");
        Ok(())
    }

    /// Register a new user under a caller-supplied id
    pub fn create_user(&self, id: i64) -> StoreResult<User> {
        let created_at = self.create(&USERS, &id, EntityRef::user(id))?;
        info!(user_id = id, "user created");
        Ok(User { id, created_at })
    }

    /// Delete a user
    pub fn delete_user(&self, id: i64) -> StoreResult<()> {
        self.delete(&USERS, &id, EntityRef::user(id))?;
        info!(user_id = id, "user deleted");
        Ok(())
    }

    fn create(
        &self,
        entity: &EntityTable,
        key: &dyn ToSql,
        entity_ref: EntityRef,
    ) -> StoreResult<DateTime<Utc>> {
        let mut conn = self.db.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = created_at(&tx, entity, key)? {
            debug!(%entity_ref, "already registered");
            return Err(StoreError::AlreadyExists {
                entity: entity_ref,
                created_at: Some(existing),
            });
        }

        let now = Utc::now();
        insert_row(&tx, entity, key, entity_ref, now)?;

        tx.commit()?;
        Ok(now)
    }

    fn delete(
        &self,
        entity: &EntityTable,
        key: &dyn ToSql,
        entity_ref: EntityRef,
    ) -> StoreResult<()> {
        let mut conn = self.db.connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if created_at(&tx, entity, key)?.is_none() {
            return Err(StoreError::NotFound { entity: entity_ref });
        }

        if self.delete_policy == DeletePolicy::Cascade {
            let sql = format!(
                "DELETE FROM user_segments WHERE {} = ?1",
                entity.membership_key
            );
            let removed = tx.execute(&sql, [key])?;
            debug!(%entity_ref, removed, "cascaded memberships");
        }

        let sql = format!("DELETE FROM {} WHERE {} = ?1", entity.table, entity.key);
        match tx.execute(&sql, [key]) {
            Ok(0) => return Err(StoreError::NotFound { entity: entity_ref }),
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                debug!(%entity_ref, "delete blocked by memberships");
                return Err(StoreError::DependentRowsExist { entity: entity_ref });
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit()?;
        Ok(())
    }
}

fn created_at(
    conn: &Connection,
    entity: &EntityTable,
    key: &dyn ToSql,
) -> StoreResult<Option<DateTime<Utc>>> {
    let sql = format!(
        "SELECT created_at FROM {} WHERE {} = ?1",
        entity.table, entity.key
    );
    let raw: Option<String> = conn
        .query_row(&sql, [key], |row| row.get(0))
        .optional()?;
    raw.map(|s| parse_timestamp(&s)).transpose()
}

/// Look up a segment row
pub(crate) fn find_segment(conn: &Connection, slug: &str) -> StoreResult<Option<Segment>> {
    Ok(created_at(conn, &SEGMENTS, &slug)?.map(|created_at| Segment {
        slug: slug.to_string(),
        created_at,
    }))
}

/// Look up a user row
pub(crate) fn find_user(conn: &Connection, id: i64) -> StoreResult<Option<User>> {
    Ok(created_at(conn, &USERS, &id)?.map(|created_at| User { id, created_at }))
}

pub(crate) fn user_exists(conn: &Connection, id: i64) -> StoreResult<bool> {
    let exists: bool = conn
        .prepare_cached("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)")?
        .query_row([id], |row| row.get(0))?;
    Ok(exists)
}

pub(crate) fn segment_exists(conn: &Connection, slug: &str) -> StoreResult<bool> {
    let exists: bool = conn
        .prepare_cached("SELECT EXISTS(SELECT 1 FROM segments WHERE slug = ?1)")?
        .query_row([slug], |row| row.get(0))?;
    Ok(exists)
}

/// Insert a registry row. The primary key is the final word on duplicates,
/// so a conflicting row yields `AlreadyExists` without a timestamp.
fn insert_row(
    conn: &Connection,
    entity: &EntityTable,
    key: &dyn ToSql,
    entity_ref: EntityRef,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    let sql = format!(
        "INSERT INTO {} ({}, created_at) VALUES (?1, ?2)",
        entity.table, entity.key
    );
    match conn.execute(&sql, params![key, now.to_rfc3339()]) {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => {
            warn!(%entity_ref, "insert lost a race after the pre-check");
            Err(StoreError::AlreadyExists {
                entity: entity_ref,
                created_at: None,
            })
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::unavailable(format!("Corrupt timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(policy: DeletePolicy) -> StoreResult<EntityRegistry> {
        Ok(EntityRegistry::new(Arc::new(Database::open_memory()?), policy))
    }

    fn link(registry: &EntityRegistry, user_id: i64, slug: &str) -> anyhow::Result<()> {
        registry.db.connection()?.execute(
            "INSERT INTO user_segments (user_id, slug) VALUES (?1, ?2)",
            params![user_id, slug],
        )?;
        Ok(())
    }

    #[test]
    fn test_create_segment_twice() -> anyhow::Result<()> {
        let registry = registry(DeletePolicy::Restrict)?;

        let created = registry.create_segment("AVITO_VOICE_MESSAGES")?;
        assert_eq!(created.slug, "AVITO_VOICE_MESSAGES");

        let err = registry.create_segment("AVITO_VOICE_MESSAGES").unwrap_err();
        match err {
            StoreError::AlreadyExists { entity, created_at } => {
                assert_eq!(entity, EntityRef::segment("AVITO_VOICE_MESSAGES"));
                assert_eq!(created_at, Some(created.created_at));
            }
            other => panic!("unexpected error: {other}"),
        }

        Ok(())
    }

    #[test]
    fn test_create_user_twice() -> anyhow::Result<()> {
        let registry = registry(DeletePolicy::Restrict)?;

        registry.create_user(1000)?;
        assert!(registry.create_user(1000).unwrap_err().is_already_exists());

        Ok(())
    }

    #[test]
    fn test_conflicting_insert_maps_to_already_exists() -> anyhow::Result<()> {
        let registry = registry(DeletePolicy::Restrict)?;
        registry.create_segment("AVITO_DISCOUNT_30")?;
        registry.create_user(42)?;

        // A writer that skipped the pre-check only has the constraint to go on
        let conn = registry.db.connection()?;
        let slug = "AVITO_DISCOUNT_30";
        let err = insert_row(&conn, &SEGMENTS, &slug, EntityRef::segment(slug), Utc::now())
            .unwrap_err();
        match err {
            StoreError::AlreadyExists { entity, created_at } => {
                assert_eq!(entity, EntityRef::segment(slug));
                assert_eq!(created_at, None);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = insert_row(&conn, &USERS, &42i64, EntityRef::user(42), Utc::now()).unwrap_err();
        assert!(err.is_already_exists(), "unexpected error: {err}");

        let rows: i64 = conn.query_row("SELECT COUNT(*) FROM segments", [], |row| row.get(0))?;
        assert_eq!(rows, 1);

        Ok(())
    }

    #[test]
    fn test_delete_missing() -> anyhow::Result<()> {
        let registry = registry(DeletePolicy::Restrict)?;

        assert!(matches!(
            registry.delete_segment("nope"),
            Err(StoreError::NotFound { entity: EntityRef::Segment(_) })
        ));
        assert!(matches!(
            registry.delete_user(5),
            Err(StoreError::NotFound { entity: EntityRef::User(5) })
        ));

        Ok(())
    }

    #[test]
    fn test_delete_then_recreate() -> anyhow::Result<()> {
        let registry = registry(DeletePolicy::Restrict)?;

        registry.create_segment("AVITO_DISCOUNT_30")?;
        registry.delete_segment("AVITO_DISCOUNT_30")?;
        registry.create_segment("AVITO_DISCOUNT_30")?;

        registry.create_user(3)?;
        registry.delete_user(3)?;
        assert!(registry.delete_user(3).unwrap_err().is_not_found());

        Ok(())
    }

    #[test]
    fn test_restrict_blocks_referenced_deletes() -> anyhow::Result<()> {
        let registry = registry(DeletePolicy::Restrict)?;
        registry.create_segment("AVITO_PERFORMANCE_VAS")?;
        registry.create_user(7)?;
        link(&registry, 7, "AVITO_PERFORMANCE_VAS")?;

        assert!(matches!(
            registry.delete_segment("AVITO_PERFORMANCE_VAS"),
            Err(StoreError::DependentRowsExist { .. })
        ));
        assert!(matches!(
            registry.delete_user(7),
            Err(StoreError::DependentRowsExist { .. })
        ));

        // Nothing was removed
        let conn = registry.db.connection()?;
        assert!(find_segment(&conn, "AVITO_PERFORMANCE_VAS")?.is_some());
        assert!(find_user(&conn, 7)?.is_some());
        let links: i64 = conn.query_row("SELECT COUNT(*) FROM user_segments", [], |r| r.get(0))?;
        assert_eq!(links, 1);

        Ok(())
    }

    #[test]
    fn test_cascade_removes_memberships() -> anyhow::Result<()> {
        let registry = registry(DeletePolicy::Cascade)?;
        registry.create_segment("A")?;
        registry.create_segment("B")?;
        registry.create_user(1)?;
        registry.create_user(2)?;
        link(&registry, 1, "A")?;
        link(&registry, 2, "A")?;
        link(&registry, 1, "B")?;

        registry.delete_segment("A")?;
        registry.delete_user(1)?;

        let conn = registry.db.connection()?;
        assert!(find_segment(&conn, "A")?.is_none());
        assert!(find_user(&conn, 1)?.is_none());
        let links: i64 = conn.query_row("SELECT COUNT(*) FROM user_segments", [], |r| r.get(0))?;
        assert_eq!(links, 0);
        assert!(find_user(&conn, 2)?.is_some());

        Ok(())
    }

    #[test]
    fn test_lookups() -> anyhow::Result<()> {
        let registry = registry(DeletePolicy::Restrict)?;
        let user = registry.create_user(42)?;

        let conn = registry.db.connection()?;
        assert_eq!(find_user(&conn, 42)?, Some(user));
        assert!(user_exists(&conn, 42)?);
        assert!(!user_exists(&conn, 43)?);
        assert!(!segment_exists(&conn, "missing")?);

        Ok(())
    }
}
