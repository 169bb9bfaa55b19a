use derive_more::Display;

use super::error::{ErrorKind, Result};

/// Where one section's sync currently stands.
///
/// ```text
/// Idle -> FetchingPage(n) -> Reconciling(n) -> FetchingPage(n + 1) | Completed -> Idle
///         FetchingPage(n) | Reconciling(n)  -> Failed -> Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SyncState {
    #[display("idle")]
    Idle,
    #[display("fetching page {_0}")]
    FetchingPage(u32),
    #[display("reconciling page {_0}")]
    Reconciling(u32),
    #[display("completed")]
    Completed,
    #[display("failed")]
    Failed,
}

impl SyncState {
    pub fn can_transition(&self, next: &SyncState) -> bool {
        use SyncState::*;
        match (*self, *next) {
            (Idle, FetchingPage(_)) => true,
            (FetchingPage(n), Reconciling(m)) => n == m,
            (Reconciling(n), FetchingPage(m)) => m == n.saturating_add(1),
            (Reconciling(_), Completed) => true,
            (FetchingPage(_) | Reconciling(_), Failed) => true,
            (Completed | Failed, Idle) => true,
            _ => false,
        }
    }

    /// Move to `next`, refusing anything the machine above does not allow.
    pub fn advance(&mut self, next: SyncState) -> Result<()> {
        if !self.can_transition(&next) {
            exn::bail!(ErrorKind::InvalidTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn walks_a_two_page_pass() {
        let mut state = SyncState::Idle;
        for next in [
            SyncState::FetchingPage(1),
            SyncState::Reconciling(1),
            SyncState::FetchingPage(2),
            SyncState::Reconciling(2),
            SyncState::Completed,
            SyncState::Idle,
        ] {
            state.advance(next).unwrap();
        }
        assert_eq!(state, SyncState::Idle);
    }

    #[test]
    fn resumed_pass_may_start_mid_listing() {
        let mut state = SyncState::Idle;
        state.advance(SyncState::FetchingPage(7)).unwrap();
        state.advance(SyncState::Failed).unwrap();
        assert!(state.is_terminal());
        state.advance(SyncState::Idle).unwrap();
    }

    #[rstest]
    #[case(SyncState::Idle, SyncState::Completed)]
    #[case(SyncState::Idle, SyncState::Reconciling(1))]
    #[case(SyncState::FetchingPage(1), SyncState::Completed)]
    #[case(SyncState::FetchingPage(1), SyncState::Reconciling(2))]
    #[case(SyncState::Reconciling(1), SyncState::FetchingPage(3))]
    #[case(SyncState::Completed, SyncState::FetchingPage(1))]
    #[case(SyncState::Failed, SyncState::Completed)]
    #[case(SyncState::Idle, SyncState::Failed)]
    fn rejects(#[case] from: SyncState, #[case] to: SyncState) {
        let mut state = from;
        let error = state.advance(to).unwrap_err();
        assert!(matches!(*error, ErrorKind::InvalidTransition { .. }));
        assert_eq!(state, from);
    }
}
