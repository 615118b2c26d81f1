//! cohorts - User segment membership store
//!
//! Assigns users to named segments (cohort tags) and keeps the three tables
//! involved consistent under concurrent, partially-valid batch operations.
//!
//! ## Key Concepts
//!
//! - **Segment**: a cohort tag keyed by its slug
//! - **User**: keyed by a caller-supplied integer id
//! - **Membership**: a `(user, segment)` pair; both ends must exist
//! - **Batch**: a set of slugs added to or removed from one user at once;
//!   unknown slugs are dropped, an all-unknown batch is an error

pub mod cli;
pub mod config;
pub mod core;

pub use config::Config;
pub use core::error::{EntityRef, StoreError, StoreResult};
pub use core::model::{BatchOutcome, DeletePolicy, Segment, StoreStats, User};
pub use core::store::Store;
