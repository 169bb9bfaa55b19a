//! Error types for the [`sync`](super) module.

use derive_more::{Display, Error};

use super::state::SyncState;

/// A sync error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a prune pass refused to touch the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum GuardReason {
    #[display("{found} local items, at least {required} required")]
    TooFewItems { found: u64, required: u64 },
    #[display("{found} categories present, at least {required} required")]
    TooFewCategories { found: usize, required: usize },
    #[display("{orphans} of {total} local items missing upstream, at most {allowed} allowed")]
    TooManyOrphans { orphans: u64, total: u64, allowed: u64 },
    #[display("the pass did not cover every section from its first page")]
    IncompletePass,
}

/// Classifies the origin of a sync failure.
///
/// ### Operational Errors
/// - [`ErrorKind::InvalidTransition`]
/// - [`ErrorKind::GuardTripped`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Cache`]
#[derive(Debug, Display, Error, PartialEq, Eq)]
pub enum ErrorKind {
    /// Reading or writing the catalog store failed.
    #[display("catalog store failed")]
    Cache,
    #[display("invalid sync transition from {from} to {to}")]
    InvalidTransition {
        #[error(not(source))]
        from: SyncState,
        #[error(not(source))]
        to: SyncState,
    },
    /// The prune safety floor refused to run.
    #[display("prune refused: {_0}")]
    GuardTripped(#[error(not(source))] GuardReason),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache)
    }
}
