//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use reel_source::models::ContentId;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A stored or incoming value does not fit the schema.
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// The item is held by a user reference and cannot be deleted.
    #[display("content {_0} is referenced by user data")]
    Referenced(#[error(not(source))] ContentId),
    /// An episode arrived for a series that is not in the catalog.
    #[display("unknown series {_0}")]
    UnknownSeries(#[error(not(source))] ContentId),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Lock contention surfaces as a generic database error.
        matches!(self, Self::Database)
    }
}

/// `SQLITE_CONSTRAINT_TRIGGER`: how SQLite reports an `ON DELETE RESTRICT`
/// action firing, which sqlx does not classify as a foreign key violation.
const SQLITE_CONSTRAINT_TRIGGER: &str = "1811";

/// Whether `error` is SQLite refusing a write over a foreign key.
pub(crate) fn is_foreign_key_violation(error: &sqlx::Error) -> bool {
    error.as_database_error().is_some_and(|e| {
        e.is_foreign_key_violation()
            || (e.code().as_deref() == Some(SQLITE_CONSTRAINT_TRIGGER) && e.message().contains("FOREIGN KEY"))
    })
}
