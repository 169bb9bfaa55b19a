//! Time-boxed execution of matching work over untrusted text.

use std::time::Duration;

use tokio::task;
use tracing::warn;

use crate::error::{ErrorKind, Result};

/// Upper bound on matches any one pass will collect from a payload.
pub(crate) const MAX_MATCHES_PER_PASS: usize = 512;

/// Run CPU-bound matching work on the blocking pool under a wall-clock budget.
///
/// Fails closed: a pass that overruns its budget yields
/// [`ErrorKind::PatternTimeout`] and the caller treats it as "no match". The
/// worker thread cannot be interrupted, so it runs to completion in the
/// background and its result is discarded; every pass is itself bounded by
/// the payload window and [`MAX_MATCHES_PER_PASS`].
pub(crate) async fn run_bounded<T, F>(name: &'static str, budget: Duration, work: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let handle = task::spawn_blocking(work);
    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(join_error)) => {
            warn!(pass = name, error = %join_error, "pattern worker failed");
            exn::bail!(ErrorKind::WorkerAborted)
        },
        Err(_) => {
            warn!(pass = name, budget_ms = budget.as_millis() as u64, "pattern pass timed out");
            exn::bail!(ErrorKind::PatternTimeout(budget))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn returns_result_within_budget() {
        let value = run_bounded("quick", Duration::from_secs(1), || 40 + 2).await.unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn fails_closed_on_overrun() {
        let started = Instant::now();
        let error = run_bounded("slow", Duration::from_millis(50), || {
            std::thread::sleep(Duration::from_millis(500));
            1
        })
        .await
        .unwrap_err();
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(*error, ErrorKind::PatternTimeout(Duration::from_millis(50)));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn panics_surface_as_aborted() {
        let error = run_bounded("boom", Duration::from_secs(1), || -> u8 { panic!("bad pattern") }).await.unwrap_err();
        assert_eq!(*error, ErrorKind::WorkerAborted);
    }
}
