//! Store - Facade over the registry, the ledger and the query facade
//!
//! All three share one [`Database`]. `Store` is cheap to clone and can be
//! handed to as many threads as needed.
//!
//! # Operations
//! | Operation | Success | Failures |
//! |---|---|---|
//! | `create_segment` | `Segment` | `AlreadyExists` |
//! | `delete_segment` | `()` | `NotFound`, `DependentRowsExist` |
//! | `create_user` | `User` | `AlreadyExists` |
//! | `delete_user` | `()` | `NotFound`, `DependentRowsExist` |
//! | `add_memberships` | `BatchOutcome` | `UserNotFound`, `NoValidSegments` |
//! | `remove_memberships` | `BatchOutcome` | `UserNotFound`, `NoValidSegments` |
//! | `get_segments` | set of slugs | `UserNotFound` |
//!
//! Any of them may also fail with `StorageUnavailable`.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use super::database::Database;
use super::error::StoreResult;
use super::ledger::MembershipLedger;
use super::model::{BatchOutcome, DeletePolicy, Segment, StoreStats, User};
use super::query::QueryFacade;
use super::registry::EntityRegistry;
use crate::config::DatabaseConfig;

/// Segment membership store
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
    registry: EntityRegistry,
    ledger: MembershipLedger,
    query: QueryFacade,
}

impl Store {
    /// Wire all components onto one shared database
    pub fn new(db: Arc<Database>, delete_policy: DeletePolicy) -> Self {
        Self {
            registry: EntityRegistry::new(db.clone(), delete_policy),
            ledger: MembershipLedger::new(db.clone()),
            query: QueryFacade::new(db.clone()),
            db,
        }
    }

    /// Open or create a database file
    pub fn open(path: &Path, config: &DatabaseConfig, delete_policy: DeletePolicy) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(Database::open(path, config)?), delete_policy))
    }

    /// Open an in-memory store (for testing)
    pub fn open_memory(delete_policy: DeletePolicy) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(Database::open_memory()?), delete_policy))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn ledger(&self) -> &MembershipLedger {
        &self.ledger
    }

    pub fn query(&self) -> &QueryFacade {
        &self.query
    }

    pub fn create_segment(&self, slug: &str) -> StoreResult<Segment> {
        self.registry.create_segment(slug)
    }

    pub fn delete_segment(&self, slug: &str) -> StoreResult<()> {
        self.registry.delete_segment(slug)
    }

    pub fn create_user(&self, id: i64) -> StoreResult<User> {
        self.registry.create_user(id)
    }

    pub fn delete_user(&self, id: i64) -> StoreResult<()> {
        self.registry.delete_user(id)
    }

    pub fn add_memberships<I, S>(&self, user_id: i64, slugs: I) -> StoreResult<BatchOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ledger.add_memberships(user_id, slugs)
    }

    pub fn remove_memberships<I, S>(&self, user_id: i64, slugs: I) -> StoreResult<BatchOutcome>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ledger.remove_memberships(user_id, slugs)
    }

    pub fn get_segments(&self, user_id: i64) -> StoreResult<BTreeSet<String>> {
        self.query.get_segments(user_id)
    }

    pub fn segment(&self, slug: &str) -> StoreResult<Segment> {
        self.query.segment(slug)
    }

    pub fn user(&self, id: i64) -> StoreResult<User> {
        self.query.user(id)
    }

    pub fn list_segments(&self) -> StoreResult<Vec<Segment>> {
        self.query.list_segments()
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        self.query.stats()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use crate::core::error::StoreError;

    fn file_store(dir: &tempfile::TempDir) -> StoreResult<Store> {
        Store::open(
            &dir.path().join("data.db"),
            &DatabaseConfig::default(),
            DeletePolicy::Restrict,
        )
    }

    #[test]
    fn test_store_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Store>();
    }

    #[test]
    fn test_membership_scenario() -> anyhow::Result<()> {
        let store = Store::open_memory(DeletePolicy::Restrict)?;
        store.create_user(1000)?;
        store.create_segment("a")?;

        store.add_memberships(1000, ["a", "b"])?;
        assert_eq!(store.get_segments(1000)?, BTreeSet::from(["a".to_string()]));

        // Referenced segment survives a delete attempt
        assert!(matches!(
            store.delete_segment("a"),
            Err(StoreError::DependentRowsExist { .. })
        ));
        assert_eq!(store.get_segments(1000)?.len(), 1);

        store.remove_memberships(1000, ["a"])?;
        store.delete_segment("a")?;
        store.delete_user(1000)?;
        assert_eq!(store.stats()?, StoreStats::default());

        Ok(())
    }

    #[test]
    fn test_parallel_create_segment_has_one_winner() -> anyhow::Result<()> {
        const WRITERS: usize = 8;

        let dir = tempfile::tempdir()?;
        let store = file_store(&dir)?;
        let barrier = Barrier::new(WRITERS);

        let results: Vec<StoreResult<Segment>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..WRITERS)
                .map(|_| {
                    let store = store.clone();
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        store.create_segment("AVITO_VOICE_MESSAGES")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("writer thread panicked"))
                .collect()
        });

        let wins = results.iter().filter(|r| r.is_ok()).count();
        let dupes = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_already_exists()))
            .count();
        assert_eq!(wins, 1);
        assert_eq!(dupes, WRITERS - 1);
        assert_eq!(store.list_segments()?.len(), 1);

        Ok(())
    }

    #[test]
    fn test_parallel_batches_for_one_user() -> anyhow::Result<()> {
        const WRITERS: usize = 6;

        let dir = tempfile::tempdir()?;
        let store = file_store(&dir)?;
        store.create_user(7)?;
        for i in 0..WRITERS {
            store.create_segment(&format!("seg-{}", i))?;
        }

        thread::scope(|scope| {
            for i in 0..WRITERS {
                let store = store.clone();
                scope.spawn(move || {
                    // Every writer also re-adds seg-0
                    store
                        .add_memberships(7, ["seg-0".to_string(), format!("seg-{}", i)])
                        .expect("batch failed");
                });
            }
        });

        assert_eq!(store.get_segments(7)?.len(), WRITERS);
        assert_eq!(store.stats()?.memberships, WRITERS as u64);

        Ok(())
    }
}
