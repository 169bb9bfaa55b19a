//! Catalog-side models and their row mappings.

mod cursor;
mod health;
mod item;
mod reference;

pub(crate) use self::cursor::CursorRow;
pub use self::cursor::SyncCursor;
pub(crate) use self::health::HealthRow;
pub(crate) use self::item::{EpisodeRow, ItemRow};
pub(crate) use self::reference::ReferenceRow;
pub use self::reference::{ReferenceKind, UserReference};

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::UtcDateTime;

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Updated,
    /// Same content, or older than what is stored.
    Unchanged,
}

pub(crate) fn timestamp(at: UtcDateTime) -> i64 {
    at.unix_timestamp()
}

pub(crate) fn from_timestamp(secs: i64, field: &'static str) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(secs).or_raise(|| ErrorKind::InvalidData(field))
}

pub(crate) fn from_optional_timestamp(secs: Option<i64>, field: &'static str) -> Result<Option<UtcDateTime>> {
    secs.map(|secs| from_timestamp(secs, field)).transpose()
}
