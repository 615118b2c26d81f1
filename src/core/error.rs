//! Store errors
//!
//! Every failure the membership store can report. Constraint violations are
//! classified at the call site that knows which entity was involved; anything
//! else coming out of SQLite is treated as the store being unavailable.

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::ffi;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The entity an error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Segment(String),
    User(i64),
}

impl EntityRef {
    pub fn segment(slug: impl Into<String>) -> Self {
        EntityRef::Segment(slug.into())
    }

    pub fn user(id: i64) -> Self {
        EntityRef::User(id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Segment(slug) => write!(f, "segment '{}'", slug),
            EntityRef::User(id) => write!(f, "user {}", id),
        }
    }
}

/// Errors returned by the registry, the ledger and the query facade.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is already registered.
    ///
    /// `created_at` is known when the pre-check saw the row; it is `None`
    /// when a concurrent writer won the race and the insert hit the
    /// uniqueness constraint instead.
    #[error("{entity} already exists{}", created_suffix(.created_at))]
    AlreadyExists {
        entity: EntityRef,
        created_at: Option<DateTime<Utc>>,
    },

    #[error("{entity} not found")]
    NotFound { entity: EntityRef },

    /// A membership batch named a user that does not exist.
    #[error("user {id} not found")]
    UserNotFound { id: i64 },

    /// Every slug in a membership batch named a missing segment.
    #[error("none of the requested segments exist (user {user_id})")]
    NoValidSegments { user_id: i64 },

    /// Memberships still reference the entity being deleted.
    #[error("{entity} is still referenced by memberships")]
    DependentRowsExist { entity: EntityRef },

    /// Connectivity, locking or I/O failure. Never retried here.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

fn created_suffix(created_at: &Option<DateTime<Utc>>) -> String {
    match created_at {
        Some(at) => format!(", created at {}", at.to_rfc3339()),
        None => String::new(),
    }
}

impl StoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound { .. } | StoreError::UserNotFound { .. }
        )
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::StorageUnavailable(_))
    }

    pub(crate) fn unavailable(message: impl fmt::Display) -> Self {
        StoreError::StorageUnavailable(message.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::unavailable(err)
    }
}

fn extended_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(inner, _) => Some(inner.extended_code),
        _ => None,
    }
}

/// Primary key or unique index collision.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        extended_code(err),
        Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) | Some(ffi::SQLITE_CONSTRAINT_UNIQUE)
    )
}

/// A row is still referenced through a foreign key.
pub(crate) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    extended_code(err) == Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_entity() {
        let err = StoreError::NotFound {
            entity: EntityRef::segment("AVITO_VOICE_MESSAGES"),
        };
        assert_eq!(err.to_string(), "segment 'AVITO_VOICE_MESSAGES' not found");

        let err = StoreError::DependentRowsExist {
            entity: EntityRef::user(7),
        };
        assert_eq!(err.to_string(), "user 7 is still referenced by memberships");
    }

    #[test]
    fn test_already_exists_mentions_creation_time_when_known() {
        let at = DateTime::parse_from_rfc3339("2023-08-30T10:00:00+00:00")
            .unwrap()
            .with_timezone(&Utc);
        let err = StoreError::AlreadyExists {
            entity: EntityRef::user(1),
            created_at: Some(at),
        };
        assert!(err.to_string().contains("created at 2023-08-30T10:00:00"));

        let raced = StoreError::AlreadyExists {
            entity: EntityRef::user(1),
            created_at: None,
        };
        assert_eq!(raced.to_string(), "user 1 already exists");
    }

    #[test]
    fn test_non_constraint_sqlite_errors_are_unavailable() {
        let err: StoreError = rusqlite::Error::InvalidQuery.into();
        assert!(err.is_unavailable());
        assert!(!is_unique_violation(&rusqlite::Error::InvalidQuery));
        assert!(!is_foreign_key_violation(&rusqlite::Error::InvalidQuery));
    }
}
