use exn::ResultExt;
use reel_source::models::{Section, SourceId};
use time::UtcDateTime;

use super::{from_optional_timestamp, timestamp};
use crate::error::{Error, ErrorKind};

/// Persisted progress of one (source, section) sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    pub source: SourceId,
    pub section: Section,
    /// High-water mark of upstream last-modified times seen in completed pages.
    pub last_synced: Option<UtcDateTime>,
    /// Last page of the current pass that was fully reconciled. Zero when no
    /// pass is in progress.
    pub last_page_completed: u32,
}
impl SyncCursor {
    pub fn new(source: SourceId, section: Section) -> Self {
        Self {
            source,
            section,
            last_synced: None,
            last_page_completed: 0,
        }
    }

    /// Page a pass should (re)start from.
    pub fn next_page(&self) -> u32 {
        self.last_page_completed.saturating_add(1)
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CursorRow {
    pub(crate) source: String,
    pub(crate) section: String,
    pub(crate) last_synced: Option<i64>,
    pub(crate) last_page_completed: i64,
}
impl From<&SyncCursor> for CursorRow {
    fn from(cursor: &SyncCursor) -> Self {
        Self {
            source: cursor.source.to_string(),
            section: cursor.section.as_str().to_string(),
            last_synced: cursor.last_synced.map(timestamp),
            last_page_completed: i64::from(cursor.last_page_completed),
        }
    }
}
impl TryFrom<CursorRow> for SyncCursor {
    type Error = Error;
    fn try_from(row: CursorRow) -> Result<Self, Self::Error> {
        Ok(Self {
            source: SourceId::new(row.source),
            section: row.section.parse::<Section>().or_raise(|| ErrorKind::InvalidData("section"))?,
            last_synced: from_optional_timestamp(row.last_synced, "last synced")?,
            last_page_completed: u32::try_from(row.last_page_completed)
                .or_raise(|| ErrorKind::InvalidData("last page completed"))?,
        })
    }
}
