use exn::ResultExt;
use reel_health::HealthRecord;

use super::{from_optional_timestamp, timestamp};
use crate::error::{Error, ErrorKind};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct HealthRow {
    pub(crate) source: String,
    pub(crate) mirror: String,
    pub(crate) consecutive_failures: i64,
    pub(crate) total_failures: i64,
    pub(crate) last_success: Option<i64>,
    pub(crate) last_failure: Option<i64>,
    pub(crate) last_reason: Option<String>,
    pub(crate) suspended_until: Option<i64>,
}
impl TryFrom<&HealthRecord> for HealthRow {
    type Error = Error;
    fn try_from(record: &HealthRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            source: record.source.clone(),
            mirror: record.mirror.clone(),
            consecutive_failures: i64::from(record.consecutive_failures),
            total_failures: i64::try_from(record.total_failures).or_raise(|| ErrorKind::InvalidData("total failures"))?,
            last_success: record.last_success.map(timestamp),
            last_failure: record.last_failure.map(timestamp),
            last_reason: record.last_reason.clone(),
            suspended_until: record.suspended_until.map(timestamp),
        })
    }
}
impl TryFrom<HealthRow> for HealthRecord {
    type Error = Error;
    fn try_from(row: HealthRow) -> Result<Self, Self::Error> {
        Ok(Self {
            source: row.source,
            mirror: row.mirror,
            consecutive_failures: u32::try_from(row.consecutive_failures)
                .or_raise(|| ErrorKind::InvalidData("consecutive failures"))?,
            total_failures: u64::try_from(row.total_failures).or_raise(|| ErrorKind::InvalidData("total failures"))?,
            last_success: from_optional_timestamp(row.last_success, "last success")?,
            last_failure: from_optional_timestamp(row.last_failure, "last failure")?,
            last_reason: row.last_reason,
            suspended_until: from_optional_timestamp(row.suspended_until, "suspended until")?,
        })
    }
}
