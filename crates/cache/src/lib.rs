//! Durable catalog store and query surface.
//!
//! The SQLite database holds everything that must survive a restart: catalog
//! items and episodes keyed by deterministic content ids, per-section sync
//! cursors, health records and user references. [`Catalog`] layers a bounded
//! read-through cache and per-id write serialization on top of
//! [`Repository`].

mod bounded;
mod catalog;
mod db;
pub mod error;
pub mod models;
mod repo;
mod search;

pub use crate::bounded::{BoundedCache, Lookup};
pub use crate::catalog::{Catalog, CatalogOptions, Items};
pub use crate::db::Database;
pub use crate::repo::Repository;
pub use crate::search::sanitize_match_query;
