//! Error types for the [`resolve`](super) module.

use std::time::Duration;

use derive_more::{Display, Error};

/// A resolve error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for resolve operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why one lead of a resolution produced nothing.
///
/// These are collected into [`Resolution::failures`](super::Resolution)
/// rather than aborting the resolution.
#[derive(Debug, Clone, Display, Error, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source adapter could not fetch the reference.
    #[display("fetch failed: {_0}")]
    Fetch(#[error(not(source))] reel_source::error::ErrorKind),
    /// An extraction pass over the payload failed.
    #[display("extraction failed: {_0}")]
    Extract(#[error(not(source))] reel_extract::error::ErrorKind),
    #[display("gave up after {}ms", _0.as_millis())]
    Timeout(#[error(not(source))] Duration),
    /// The payload was read but held nothing playable.
    #[display("nothing playable found")]
    NothingFound,
    #[display("request gate closed")]
    GateClosed,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(kind) => kind.is_retryable(),
            Self::Timeout(_) => true,
            Self::Extract(_) | Self::NothingFound | Self::GateClosed => false,
        }
    }
}
