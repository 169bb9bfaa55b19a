//! CLI Error Types

use derive_more::{Display, Error};

/// A command error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for command operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("catalog store error")]
    Catalog,
    /// Health records could not be restored or persisted.
    #[display("health bookkeeping error")]
    Health,
    /// No configured source has this id.
    #[display("unknown source: {_0}")]
    UnknownSource(#[error(not(source))] String),
    #[display("no sources are configured")]
    NoSources,
    /// A configured source could not be turned into an adapter.
    #[display("source {_0} could not be set up")]
    Source(#[error(not(source))] String),
    #[display("could not write output")]
    Output,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Catalog)
    }
}
