//! Core module - Segment membership store
//!
//! Contains the storage engine: the entity registry (segments, users), the
//! membership ledger (user ↔ segment pairs) and the query facade, all sharing
//! one SQLite database.

pub mod database;
pub mod error;
pub mod ledger;
pub mod model;
pub mod query;
pub mod registry;
pub mod store;
