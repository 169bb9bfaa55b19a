use serde::{Deserialize, Serialize};
use time::UtcDateTime;

/// Health of one mirror of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub source: String,
    /// Mirror host, or [`SOURCE_SCOPE`](crate::SOURCE_SCOPE) for the source
    /// as a whole.
    pub mirror: String,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub last_success: Option<UtcDateTime>,
    pub last_failure: Option<UtcDateTime>,
    pub last_reason: Option<String>,
    pub suspended_until: Option<UtcDateTime>,
}

impl HealthRecord {
    pub fn new(source: impl Into<String>, mirror: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mirror: mirror.into(),
            consecutive_failures: 0,
            total_failures: 0,
            last_success: None,
            last_failure: None,
            last_reason: None,
            suspended_until: None,
        }
    }

    pub fn is_suspended_at(&self, now: UtcDateTime) -> bool {
        self.suspended_until.is_some_and(|until| until > now)
    }

    /// Most recent success or failure.
    pub fn last_activity(&self) -> Option<UtcDateTime> {
        self.last_success.max(self.last_failure)
    }
}

/// Cut `reason` to at most `cap` bytes without splitting a character.
pub(crate) fn cap_reason(reason: &str, cap: usize) -> String {
    if reason.len() <= cap {
        return reason.to_string();
    }
    let mut end = cap;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("short", 10, "short")]
    #[case("exactly", 7, "exactly")]
    #[case("truncated", 5, "trunc")]
    #[case("naïve", 3, "na")]
    #[case("日本語", 4, "日")]
    #[case("anything", 0, "")]
    fn caps_reasons_on_char_boundaries(#[case] reason: &str, #[case] cap: usize, #[case] expected: &str) {
        assert_eq!(cap_reason(reason, cap), expected);
    }
}
