use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use reel_source::models::ContentId;
use time::UtcDateTime;

use super::from_timestamp;
use crate::error::{Error, ErrorKind};

/// A user-owned record pointing at a catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Watchlist,
    Progress,
}
impl ReferenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Watchlist => "watchlist",
            Self::Progress => "progress",
        }
    }
}
impl FromStr for ReferenceKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "watchlist" => Ok(Self::Watchlist),
            "progress" => Ok(Self::Progress),
            _ => exn::bail!(ErrorKind::InvalidData("reference kind")),
        }
    }
}
impl Display for ReferenceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserReference {
    pub content_id: ContentId,
    pub kind: ReferenceKind,
    /// Playback position, for [`ReferenceKind::Progress`].
    pub position_secs: Option<u32>,
    pub created_at: UtcDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ReferenceRow {
    pub(crate) content_id: i64,
    pub(crate) kind: String,
    pub(crate) position_secs: Option<i64>,
    pub(crate) created_at: i64,
}
impl TryFrom<ReferenceRow> for UserReference {
    type Error = Error;
    fn try_from(row: ReferenceRow) -> Result<Self, Self::Error> {
        use exn::ResultExt;
        Ok(Self {
            content_id: ContentId::from_raw(row.content_id),
            kind: row.kind.parse()?,
            position_secs: row
                .position_secs
                .map(|p| u32::try_from(p).or_raise(|| ErrorKind::InvalidData("position")))
                .transpose()?,
            created_at: from_timestamp(row.created_at, "created at")?,
        })
    }
}
