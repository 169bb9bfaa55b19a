//! Extraction Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::time::Duration;

/// An extraction error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The payload is too broken to yield anything; skip this candidate source.
    #[display("malformed payload: {_0}")]
    MalformedPayload(#[error(not(source))] String),
    /// The payload exceeded the configured memory budget.
    #[display("payload exceeds {_0} byte budget")]
    CapacityExceeded(#[error(not(source))] usize),
    /// A pattern match against untrusted text ran out of wall-clock time.
    #[display("pattern match exceeded {}ms budget", _0.as_millis())]
    PatternTimeout(#[error(not(source))] Duration),
    /// A field was found but could not be parsed.
    #[display("failed to parse field '{field}', found value: {value}")]
    ParseError {
        /// The field that failed to parse.
        field: &'static str,
        /// Details about the parsing failure.
        value: String,
    },
    /// The blocking worker running a match was torn down before finishing.
    #[display("pattern worker aborted")]
    WorkerAborted,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A saturated blocking pool can starve a match; the payload itself is
        // deterministic.
        matches!(self, Self::PatternTimeout(_) | Self::WorkerAborted)
    }
}
