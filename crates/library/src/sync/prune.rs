use std::collections::HashSet;

use exn::ResultExt;
use reel_cache::error::ErrorKind as CacheErrorKind;
use reel_source::models::{ContentId, SourceId};
use tracing::{error, info, instrument, warn};

use super::SyncEngine;
use super::error::{ErrorKind, GuardReason, Result};
use super::report::PruneReport;

impl SyncEngine {
    /// Reconcile the local catalog of `source` against the ids seen upstream
    /// during a complete pass.
    ///
    /// Refuses to do anything unless the local catalog looks plausible: at
    /// least `min_items` items spread over `min_categories` categories, with
    /// no more than `max_fraction` of them missing upstream. A refusal is
    /// returned as [`ErrorKind::GuardTripped`].
    ///
    /// Orphans that a user reference points at keep their catalog row and
    /// lose the references. All other orphans are deleted.
    #[instrument(skip(self, upstream), fields(source = %source, upstream = upstream.len()))]
    pub async fn prune(&self, source: &SourceId, upstream: &HashSet<ContentId>) -> Result<PruneReport> {
        let repo = self.catalog().repository();
        let floor = &self.options().floor;

        let local = repo.list_ids(source).await.or_raise(|| ErrorKind::Cache)?;
        let counts = repo.count_by_category(source).await.or_raise(|| ErrorKind::Cache)?;
        let total = u64::try_from(local.len()).unwrap_or(u64::MAX);
        let categories = counts.values().filter(|&&count| count > 0).count();
        let orphans: Vec<ContentId> = local.into_iter().filter(|id| !upstream.contains(id)).collect();
        let orphan_count = u64::try_from(orphans.len()).unwrap_or(u64::MAX);
        let allowed = (floor.max_fraction.clamp(0.0, 1.0) * total as f64).floor() as u64;

        let refusal = if total < floor.min_items {
            Some(GuardReason::TooFewItems { found: total, required: floor.min_items })
        } else if categories < floor.min_categories {
            Some(GuardReason::TooFewCategories { found: categories, required: floor.min_categories })
        } else if orphan_count > allowed {
            Some(GuardReason::TooManyOrphans { orphans: orphan_count, total, allowed })
        } else {
            None
        };
        if let Some(reason) = refusal {
            error!(source = %source, %reason, "prune guard tripped, catalog left untouched");
            exn::bail!(ErrorKind::GuardTripped(reason));
        }

        let mut report = PruneReport { orphans: orphan_count, ..PruneReport::default() };
        if orphans.is_empty() {
            return Ok(report);
        }
        let referenced = repo.referenced_among(&orphans).await.or_raise(|| ErrorKind::Cache)?;
        for id in orphans {
            if referenced.contains(&id) {
                let removed = repo.remove_references(id).await.or_raise(|| ErrorKind::Cache)?;
                info!(%id, removed, "orphan still referenced, references removed");
                report.ghosted += 1;
                continue;
            }
            match self.catalog().delete(id).await {
                Ok(true) => report.deleted += 1,
                Ok(false) => {},
                // Someone referenced it since the check above.
                Err(error) if matches!(*error, CacheErrorKind::Referenced(_)) => {
                    warn!(%id, "orphan gained a reference, kept");
                },
                Err(error) => return Err(error.raise(ErrorKind::Cache)),
            }
        }
        info!(orphans = report.orphans, deleted = report.deleted, ghosted = report.ghosted, "orphans pruned");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{PruneFloor, SyncOptions};
    use reel_cache::models::ReferenceKind;
    use reel_cache::{Catalog, CatalogOptions, Database};
    use reel_health::HealthTracker;
    use reel_source::models::{CatalogRecord, Category, ContentItem};
    use rstest::rstest;
    use std::sync::Arc;
    use time::macros::utc_datetime;

    async fn seeded(movies: usize, series: usize, floor: PruneFloor) -> (SyncEngine, Vec<ContentId>) {
        let db = Database::connect_in_memory().await.unwrap();
        let catalog = Catalog::new(db, CatalogOptions::default());
        let mut ids = Vec::new();
        for (category, count) in [(Category::Movie, movies), (Category::Series, series)] {
            for n in 0..count {
                let item = ContentItem::new(
                    SourceId::new("mock"),
                    format!("{category}-{n}"),
                    category,
                    "Title",
                    utc_datetime!(2025-01-01 0:00),
                );
                ids.push(item.id);
                catalog.upsert(&CatalogRecord::Item(item)).await.unwrap();
            }
        }
        let options = SyncOptions { floor, ..SyncOptions::default() };
        (SyncEngine::new(catalog, Arc::new(HealthTracker::default()), options), ids)
    }

    #[tokio::test]
    async fn removes_unreferenced_orphans() {
        let (engine, ids) = seeded(200, 40, PruneFloor::default()).await;
        let upstream: HashSet<ContentId> = ids[3..].iter().copied().collect();

        let report = engine.prune(&SourceId::new("mock"), &upstream).await.unwrap();
        assert_eq!(report, PruneReport { orphans: 3, deleted: 3, ghosted: 0 });
        assert_eq!(engine.catalog().repository().list_ids(&SourceId::new("mock")).await.unwrap().len(), 237);
    }

    #[tokio::test]
    async fn empty_catalog_trips_the_guard() {
        let (engine, _) = seeded(0, 0, PruneFloor::default()).await;
        let error = engine.prune(&SourceId::new("mock"), &HashSet::new()).await.unwrap_err();
        assert!(matches!(
            &*error,
            ErrorKind::GuardTripped(GuardReason::TooFewItems { found: 0, required: 50 })
        ));
    }

    #[rstest]
    #[case::single_category(120, 0, GuardReason::TooFewCategories { found: 1, required: 2 })]
    #[case::too_small(30, 10, GuardReason::TooFewItems { found: 40, required: 50 })]
    #[tokio::test]
    async fn implausible_catalog_is_left_alone(#[case] movies: usize, #[case] series: usize, #[case] reason: GuardReason) {
        let (engine, ids) = seeded(movies, series, PruneFloor::default()).await;
        let error = engine.prune(&SourceId::new("mock"), &HashSet::new()).await.unwrap_err();
        assert_eq!(*error, ErrorKind::GuardTripped(reason));
        assert_eq!(engine.catalog().repository().list_ids(&SourceId::new("mock")).await.unwrap().len(), ids.len());
    }

    #[tokio::test]
    async fn mass_disappearance_trips_the_guard() {
        let (engine, ids) = seeded(80, 20, PruneFloor::default()).await;
        // Upstream returned only the first half: far beyond the 20% allowance.
        let upstream: HashSet<ContentId> = ids[..50].iter().copied().collect();
        let error = engine.prune(&SourceId::new("mock"), &upstream).await.unwrap_err();
        assert_eq!(
            *error,
            ErrorKind::GuardTripped(GuardReason::TooManyOrphans { orphans: 50, total: 100, allowed: 20 })
        );
    }

    #[tokio::test]
    async fn referenced_orphans_are_ghosted() {
        let floor = PruneFloor { min_items: 1, min_categories: 1, max_fraction: 1.0 };
        let (engine, ids) = seeded(4, 0, floor).await;
        let repo = engine.catalog().repository();
        repo.add_reference(ids[0], ReferenceKind::Watchlist, None).await.unwrap();
        repo.add_reference(ids[0], ReferenceKind::Progress, Some(600)).await.unwrap();

        let upstream: HashSet<ContentId> = ids[2..].iter().copied().collect();
        let report = engine.prune(&SourceId::new("mock"), &upstream).await.unwrap();
        assert_eq!(report, PruneReport { orphans: 2, deleted: 1, ghosted: 1 });
        assert!(repo.get_by_id(ids[0]).await.unwrap().is_some());
        assert!(repo.get_by_id(ids[1]).await.unwrap().is_none());
        assert!(repo.list_references().await.unwrap().is_empty());
    }
}
