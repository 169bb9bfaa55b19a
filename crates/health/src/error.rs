//! Health Error Types

use derive_more::{Display, Error};

/// A health error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for health operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A persisted record could not be restored.
    #[display("invalid health record: {_0}")]
    InvalidRecord(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
