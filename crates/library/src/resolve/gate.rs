use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use exn::ResultExt;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, sleep_until};

use super::error::{ErrorKind, Result};

/// Concurrency limit plus a minimum gap between request starts.
///
/// Every request sent through the gate holds one of a fixed number of
/// permits while it runs, and no two requests start closer together than
/// `spacing`.
#[derive(Debug)]
pub struct RequestGate {
    permits: Arc<Semaphore>,
    spacing: Duration,
    next_start: Mutex<Option<Instant>>,
}

impl RequestGate {
    pub fn new(permits: usize, spacing: Duration) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(permits.max(1))),
            spacing,
            next_start: Mutex::new(None),
        }
    }

    /// Wait for a permit and for the spacing since the previous start.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        let permit = self.permits.clone().acquire_owned().await.or_raise(|| ErrorKind::GateClosed)?;
        let mut next_start = self.next_start.lock().await;
        if let Some(at) = *next_start {
            sleep_until(at).await;
        }
        *next_start = Some(Instant::now() + self.spacing);
        Ok(permit)
    }

    /// Run `request` once the gate lets it through.
    pub async fn run<F: Future>(&self, request: F) -> Result<F::Output> {
        let _permit = self.acquire().await?;
        Ok(request.await)
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Refuse every waiting and future request.
    pub fn close(&self) {
        self.permits.close();
    }
}

impl Default for RequestGate {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}
