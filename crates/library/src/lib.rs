//! Catalog sync and playback resolution on top of the source, extraction,
//! health and cache crates.

pub mod error;
pub mod resolve;
pub mod sync;

use exn::ResultExt;
use reel_cache::Catalog;
use reel_health::HealthTracker;
use tracing::{info, instrument};

pub use crate::resolve::{Resolution, ResolveOptions, Resolver};
pub use crate::sync::{SyncEngine, SyncOptions, SyncReport};
use crate::error::{ErrorKind, Result};

/// Load persisted health records into `tracker`, dropping the ones past
/// retention first. Returns how many were restored.
#[instrument(skip_all)]
pub async fn restore_health(catalog: &Catalog, tracker: &HealthTracker) -> Result<usize> {
    let records = catalog.repository().load_health().await.or_raise(|| ErrorKind::Cache)?;
    let restored = tracker.restore(records).or_raise(|| ErrorKind::Health)?;
    let expired = tracker.prune_expired();
    info!(restored, expired, "health records restored");
    Ok(restored.saturating_sub(expired))
}

/// Write the tracker's current records to the catalog store, replacing
/// whatever was persisted before.
#[instrument(skip_all)]
pub async fn persist_health(catalog: &Catalog, tracker: &HealthTracker) -> Result<usize> {
    tracker.prune_expired();
    let records = tracker.snapshot();
    catalog.repository().save_health(&records).await.or_raise(|| ErrorKind::Cache)?;
    Ok(records.len())
}
