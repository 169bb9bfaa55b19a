use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use time::UtcDateTime;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, Result};
use crate::policy::HealthPolicy;
use crate::record::{HealthRecord, cap_reason};

type Key = (String, String);

/// In-memory health bookkeeping, shared between playback resolution and
/// catalog sync.
///
/// Every method has an `_at` variant taking the current time explicitly.
///
/// # Examples
///
/// ```
/// use reel_health::{HealthPolicy, HealthTracker};
///
/// let tracker = HealthTracker::new(HealthPolicy::default());
/// for _ in 0..3 {
///     tracker.record_failure("site", "cdn1.example.com", "connection reset");
/// }
/// assert!(tracker.is_suspended("site", "cdn1.example.com"));
/// assert!(!tracker.is_suspended("site", "cdn2.example.com"));
/// ```
#[derive(Debug, Default)]
pub struct HealthTracker {
    policy: HealthPolicy,
    records: RwLock<HashMap<Key, HealthRecord>>,
}

impl HealthTracker {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            policy,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Key, HealthRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Key, HealthRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_success(&self, source: &str, mirror: &str) {
        self.record_success_at(source, mirror, UtcDateTime::now());
    }

    pub fn record_success_at(&self, source: &str, mirror: &str, now: UtcDateTime) {
        let mut records = self.write();
        let record = records
            .entry((source.to_string(), mirror.to_string()))
            .or_insert_with(|| HealthRecord::new(source, mirror));
        if record.suspended_until.is_some() || record.consecutive_failures > 0 {
            info!(source, mirror, failures = record.consecutive_failures, "mirror recovered");
        }
        record.consecutive_failures = 0;
        record.suspended_until = None;
        record.last_success = Some(now);
    }

    /// Count a failure. Returns the end of the suspension it caused, if any.
    pub fn record_failure(&self, source: &str, mirror: &str, reason: &str) -> Option<UtcDateTime> {
        self.record_failure_at(source, mirror, reason, UtcDateTime::now())
    }

    pub fn record_failure_at(&self, source: &str, mirror: &str, reason: &str, now: UtcDateTime) -> Option<UtcDateTime> {
        let mut records = self.write();
        let record = records
            .entry((source.to_string(), mirror.to_string()))
            .or_insert_with(|| HealthRecord::new(source, mirror));
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        record.total_failures = record.total_failures.saturating_add(1);
        record.last_failure = Some(now);
        record.last_reason = Some(cap_reason(reason, self.policy.reason_cap));
        match self.policy.suspension_for(record.consecutive_failures) {
            Some(span) => {
                let until = later(now, span);
                record.suspended_until = Some(until);
                warn!(
                    source,
                    mirror,
                    failures = record.consecutive_failures,
                    suspended_secs = span.as_secs(),
                    reason = %record.last_reason.as_deref().unwrap_or_default(),
                    "mirror suspended"
                );
                Some(until)
            },
            None => {
                debug!(source, mirror, failures = record.consecutive_failures, reason, "mirror failure recorded");
                None
            },
        }
    }

    pub fn is_suspended(&self, source: &str, mirror: &str) -> bool {
        self.is_suspended_at(source, mirror, UtcDateTime::now())
    }

    pub fn is_suspended_at(&self, source: &str, mirror: &str, now: UtcDateTime) -> bool {
        self.read()
            .get(&(source.to_string(), mirror.to_string()))
            .is_some_and(|record| record.is_suspended_at(now))
    }

    pub fn record(&self, source: &str, mirror: &str) -> Option<HealthRecord> {
        self.read().get(&(source.to_string(), mirror.to_string())).cloned()
    }

    /// Every record, ordered by source then mirror.
    pub fn snapshot(&self) -> Vec<HealthRecord> {
        let mut records: Vec<_> = self.read().values().cloned().collect();
        records.sort_by(|a, b| (&a.source, &a.mirror).cmp(&(&b.source, &b.mirror)));
        records
    }

    /// Load persisted records, replacing any in memory with the same key.
    pub fn restore(&self, records: impl IntoIterator<Item = HealthRecord>) -> Result<usize> {
        let mut restored = 0;
        let mut map = self.write();
        for mut record in records {
            if record.source.is_empty() || record.mirror.is_empty() {
                exn::bail!(ErrorKind::InvalidRecord(format!("{}/{}", record.source, record.mirror)));
            }
            record.last_reason = record.last_reason.map(|r| cap_reason(&r, self.policy.reason_cap));
            map.insert((record.source.clone(), record.mirror.clone()), record);
            restored += 1;
        }
        Ok(restored)
    }

    pub fn prune_expired(&self) -> usize {
        self.prune_expired_at(UtcDateTime::now())
    }

    /// Drop records idle for longer than the retention window. Suspended
    /// records are kept until their suspension ends.
    pub fn prune_expired_at(&self, now: UtcDateTime) -> usize {
        let cutoff = earlier(now, self.policy.retention);
        let mut records = self.write();
        let before = records.len();
        records.retain(|_, record| {
            record.is_suspended_at(now) || record.last_activity().is_some_and(|at| at >= cutoff)
        });
        let pruned = before - records.len();
        if pruned > 0 {
            debug!(pruned, "expired health records dropped");
        }
        pruned
    }

    pub fn order_by_health<T>(&self, source: &str, items: Vec<T>, mirror: impl Fn(&T) -> &str) -> Vec<T> {
        self.order_by_health_at(source, items, mirror, UtcDateTime::now())
    }

    /// Stable reorder: mirrors that are not suspended first, then fewer
    /// consecutive failures first. Items that tie keep their order.
    pub fn order_by_health_at<T>(
        &self,
        source: &str,
        items: Vec<T>,
        mirror: impl Fn(&T) -> &str,
        now: UtcDateTime,
    ) -> Vec<T> {
        let records = self.read();
        let mut keyed: Vec<_> = items
            .into_iter()
            .map(|item| {
                let rank = records
                    .get(&(source.to_string(), mirror(&item).to_string()))
                    .map(|record| (record.is_suspended_at(now), record.consecutive_failures))
                    .unwrap_or_default();
                (rank, item)
            })
            .collect();
        keyed.sort_by_key(|(rank, _)| *rank);
        keyed.into_iter().map(|(_, item)| item).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

fn span(duration: Duration) -> time::Duration {
    time::Duration::try_from(duration).unwrap_or(time::Duration::MAX)
}

fn later(at: UtcDateTime, by: Duration) -> UtcDateTime {
    at.saturating_add(span(by))
}

fn earlier(at: UtcDateTime, by: Duration) -> UtcDateTime {
    at.saturating_sub(span(by))
}
