//! Library Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. The [`sync`](crate::sync::error) and
//! [`resolve`](crate::resolve::error) modules carry their own kinds.

use derive_more::{Display, Error};

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The catalog store failed.
    #[display("catalog store failed")]
    Cache,
    /// Persisted health records could not be loaded.
    #[display("health records could not be restored")]
    Health,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache)
    }
}
