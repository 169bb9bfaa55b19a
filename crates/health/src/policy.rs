use std::time::Duration;

/// When failures turn into a suspension, and for how long state is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthPolicy {
    /// Consecutive failures before the first suspension. Zero disables
    /// suspension entirely.
    pub failure_threshold: u32,
    pub base_suspension: Duration,
    pub max_suspension: Duration,
    /// Records with no activity for this long are dropped.
    pub retention: Duration,
    /// Maximum stored length of a failure reason, in bytes.
    pub reason_cap: usize,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            base_suspension: Duration::from_secs(60),
            max_suspension: Duration::from_secs(60 * 60),
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            reason_cap: 256,
        }
    }
}

impl HealthPolicy {
    /// Suspension earned by `consecutive` failures in a row.
    ///
    /// The first suspension lasts `base_suspension` and every further
    /// failure doubles it, up to `max_suspension`.
    pub fn suspension_for(&self, consecutive: u32) -> Option<Duration> {
        if self.failure_threshold == 0 || consecutive < self.failure_threshold {
            return None;
        }
        let doublings = (consecutive - self.failure_threshold).min(31);
        let scaled = self.base_suspension.saturating_mul(1 << doublings);
        Some(scaled.min(self.max_suspension))
    }
}
