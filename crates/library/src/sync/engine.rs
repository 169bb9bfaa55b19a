use std::collections::HashSet;
use std::sync::Arc;

use async_stream::stream;
use futures::future::join_all;
use futures::{Stream, StreamExt, pin_mut};
use reel_cache::Catalog;
use reel_cache::models::SyncCursor;
use reel_health::{HealthTracker, SOURCE_SCOPE};
use reel_source::SourceHandle;
use reel_source::models::{CatalogRecord, ContentId, PageRequest, Section};
use time::UtcDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::error::{ErrorKind, GuardReason};
use super::report::{PruneOutcome, SectionOutcome, SectionReport, SyncReport};
use super::state::SyncState;
use super::{SyncEvent, SyncOptions};

/// Drives catalog sync runs for any number of sources.
///
/// Cloning is cheap; clones share the catalog, the health tracker and the
/// cancellation token.
#[derive(Clone)]
pub struct SyncEngine {
    catalog: Catalog,
    health: Arc<HealthTracker>,
    options: SyncOptions,
    shutdown: CancellationToken,
}

impl SyncEngine {
    pub fn new(catalog: Catalog, health: Arc<HealthTracker>, options: SyncOptions) -> Self {
        Self {
            catalog,
            health,
            options,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub(crate) fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Stop every run in progress. In-flight page requests are dropped and
    /// cursors keep their last completed page.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Sync one source and return its report.
    #[instrument(skip_all, fields(source = %source.id()))]
    pub async fn run_once(&self, source: &SourceHandle) -> SyncReport {
        let events = self.run_stream(source);
        pin_mut!(events);
        let mut report = None;
        while let Some(event) = events.next().await {
            if let SyncEvent::Finished(finished) = event {
                report = Some(finished);
            }
        }
        report.unwrap_or_else(|| SyncReport {
            source: source.id().clone(),
            sections: Vec::new(),
            prune: None,
            started_at: UtcDateTime::now(),
            finished_at: UtcDateTime::now(),
        })
    }

    /// Sync several sources side by side. One source failing, stalling or
    /// backing off does not hold up the others.
    pub async fn run_all(&self, sources: &[SourceHandle]) -> Vec<SyncReport> {
        join_all(sources.iter().map(|source| self.run_once(source))).await
    }

    /// Sync one source, streaming progress as it goes.
    pub fn run_stream<'a>(&'a self, source: &'a SourceHandle) -> impl Stream<Item = SyncEvent> + 'a {
        stream! {
            let started_at = UtcDateTime::now();
            let id = source.id().clone();
            yield SyncEvent::Started { source: id.clone() };

            let suspended = self.health.is_suspended(id.as_str(), SOURCE_SCOPE);
            if suspended {
                info!(source = %id, "source is backing off, skipping run");
            }

            let mut sections = Vec::with_capacity(source.sections().len());
            let mut seen = HashSet::new();
            for &section in source.sections() {
                if suspended {
                    let report = SectionReport::suspended(section, 0);
                    yield SyncEvent::SectionFinished(report.clone());
                    sections.push(report);
                    continue;
                }
                for await event in self.sync_section(source, section, &mut seen) {
                    if let SyncEvent::SectionFinished(report) = &event {
                        sections.push(report.clone());
                    }
                    yield event;
                }
            }

            let prune = if suspended || !self.options.prune || self.shutdown.is_cancelled() {
                None
            } else if !sections.iter().all(SectionReport::is_full_pass) {
                debug!(source = %id, "not every section covered its whole listing, prune skipped");
                Some(PruneOutcome::Refused(GuardReason::IncompletePass))
            } else {
                Some(match self.prune(&id, &seen).await {
                    Ok(report) => PruneOutcome::Pruned(report),
                    Err(error) => match &*error {
                        ErrorKind::GuardTripped(reason) => PruneOutcome::Refused(reason.clone()),
                        _ => PruneOutcome::Failed(error.to_string()),
                    },
                })
            };
            if let Some(outcome) = &prune {
                yield SyncEvent::Pruned(outcome.clone());
            }

            let report = SyncReport {
                source: id,
                sections,
                prune,
                started_at,
                finished_at: UtcDateTime::now(),
            };
            info!(
                source = %report.source,
                complete = report.is_complete(),
                inserted = report.inserted(),
                updated = report.updated(),
                failed = report.failed(),
                "sync run finished"
            );
            yield SyncEvent::Finished(report);
        }
    }

    /// Walk one section from its cursor to the end of the listing. The last
    /// event is always [`SyncEvent::SectionFinished`].
    fn sync_section<'a>(
        &'a self,
        source: &'a SourceHandle,
        section: Section,
        seen: &'a mut HashSet<ContentId>,
    ) -> impl Stream<Item = SyncEvent> + 'a {
        stream!({
            let id = source.id();
            let repo = self.catalog.repository();
            let mut cursor = match repo.get_cursor(id, section).await {
                Ok(cursor) => cursor.unwrap_or_else(|| SyncCursor::new(id.clone(), section)),
                Err(error) => {
                    warn!(source = %id, %section, error = %*error, "sync cursor unreadable");
                    let mut report = SectionReport::new(section, 0);
                    report.outcome = SectionOutcome::Failed { page: 0, reason: error.to_string() };
                    yield SyncEvent::SectionFinished(report);
                    return;
                },
            };

            let first_page = cursor.next_page();
            let mut report = SectionReport::new(section, first_page);
            let mut state = SyncState::Idle;
            let mut page = first_page;
            if first_page > 1 {
                info!(source = %id, %section, page, "resuming interrupted pass");
            }
            yield SyncEvent::SectionStarted { section, page };

            let outcome = loop {
                if self.shutdown.is_cancelled() {
                    break SectionOutcome::Cancelled { page };
                }
                if let Err(error) = state.advance(SyncState::FetchingPage(page)) {
                    break SectionOutcome::Failed { page, reason: error.to_string() };
                }

                let request = PageRequest { section, page, page_size: self.options.page_size };
                // Dropping the request future closes its connection.
                let fetched = tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => None,
                    fetched = source.fetch_page(&request) => Some(fetched),
                };
                let listing = match fetched {
                    None => break SectionOutcome::Cancelled { page },
                    Some(Ok(listing)) => {
                        self.health.record_success(id.as_str(), SOURCE_SCOPE);
                        listing
                    },
                    Some(Err(error)) => {
                        let reason = error.to_string();
                        warn!(source = %id, %section, page, error = %reason, "page request failed");
                        self.health.record_failure(id.as_str(), SOURCE_SCOPE, &reason);
                        break SectionOutcome::Failed { page, reason };
                    },
                };

                if let Err(error) = state.advance(SyncState::Reconciling(page)) {
                    break SectionOutcome::Failed { page, reason: error.to_string() };
                }
                let mut high_water = cursor.last_synced;
                let mut interrupted = false;
                for record in &listing.records {
                    if self.shutdown.is_cancelled() {
                        interrupted = true;
                        break;
                    }
                    if let CatalogRecord::Item(item) = record {
                        seen.insert(item.id);
                    }
                    match self.catalog.upsert(record).await {
                        Ok(upserted) => {
                            report.count(upserted);
                            high_water = high_water.max(Some(record.last_modified()));
                        },
                        Err(error) => {
                            report.failed += 1;
                            warn!(source = %id, %section, page, error = %*error, "record skipped");
                        },
                    }
                }
                if interrupted {
                    break SectionOutcome::Cancelled { page };
                }
                if listing.rejected > 0 {
                    report.failed += listing.rejected as u64;
                    warn!(source = %id, %section, page, rejected = listing.rejected, "unusable entries in listing");
                }

                let terminal = listing.is_terminal(self.options.page_size);
                let ceiling = !terminal && report.pages.saturating_add(1) >= self.options.max_pages;
                cursor.last_synced = high_water;
                cursor.last_page_completed = if terminal { 0 } else { page };
                if let Err(error) = repo.save_cursor(&cursor).await {
                    warn!(source = %id, %section, page, error = %*error, "sync cursor not saved");
                    break SectionOutcome::Failed { page, reason: error.to_string() };
                }
                report.pages += 1;
                yield SyncEvent::PageReconciled { section, page, records: listing.records.len() };

                if terminal || ceiling {
                    if ceiling {
                        warn!(source = %id, %section, page, "page ceiling reached, continuing next run");
                        report.hit_ceiling = true;
                    }
                    break SectionOutcome::Completed;
                }
                page += 1;

                if !self.options.page_delay.is_zero() {
                    tokio::select! {
                        () = self.shutdown.cancelled() => {},
                        () = tokio::time::sleep(self.options.page_delay) => {},
                    }
                }
            };

            let end = match outcome {
                SectionOutcome::Completed => SyncState::Completed,
                _ => SyncState::Failed,
            };
            if state.can_transition(&end) {
                _ = state.advance(end);
                _ = state.advance(SyncState::Idle);
            }
            debug!(source = %id, %section, %state, ?outcome, "section finished");

            report.outcome = outcome;
            info!(
                source = %id,
                %section,
                pages = report.pages,
                inserted = report.inserted,
                updated = report.updated,
                unchanged = report.unchanged,
                failed = report.failed,
                "section synced"
            );
            yield SyncEvent::SectionFinished(report);
        })
    }
}
