//! Catalog synchronization.
//!
//! A run walks every section a source serves, page by page, writing each
//! record through the [`Catalog`](reel_cache::Catalog). The per-section
//! cursor only moves once a page is fully reconciled, so a crash or a
//! cancellation costs some repeated work on the next run but never skips a
//! page. After a run in which every section covered its whole listing,
//! items that disappeared upstream are pruned behind a safety floor.

mod engine;
pub mod error;
mod prune;
mod report;
mod state;

use std::time::Duration;

pub use self::engine::SyncEngine;
pub use self::report::{PruneOutcome, PruneReport, SectionOutcome, SectionReport, SyncReport};
pub use self::state::SyncState;
pub use reel_cache::models::SyncCursor;
use reel_source::models::{Section, SourceId};

/// Minimum plausible catalog before orphans may be pruned.
#[derive(Debug, Clone, PartialEq)]
pub struct PruneFloor {
    pub min_items: u64,
    /// Distinct categories (movies, series) that must be present locally.
    pub min_categories: usize,
    /// Largest share of the local catalog a single prune may remove.
    pub max_fraction: f64,
}
impl Default for PruneFloor {
    fn default() -> Self {
        Self {
            min_items: 50,
            min_categories: 2,
            max_fraction: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    pub page_size: u32,
    /// Pages one section may reconcile in a single run. A section that hits
    /// the ceiling picks up from the next page on the following run.
    pub max_pages: u32,
    /// Pause between consecutive page requests to the same source.
    pub page_delay: Duration,
    /// Prune orphans after a complete run.
    pub prune: bool,
    pub floor: PruneFloor,
}
impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 20,
            max_pages: 500,
            page_delay: Duration::from_millis(250),
            prune: true,
            floor: PruneFloor::default(),
        }
    }
}

/// Progress events emitted by [`SyncEngine::run_stream`].
///
/// A run emits [`Started`](Self::Started) once, then for each section a
/// [`SectionStarted`](Self::SectionStarted), zero or more
/// [`PageReconciled`](Self::PageReconciled) and one
/// [`SectionFinished`](Self::SectionFinished); a section skipped while the
/// source is suspended only emits the last. A [`Pruned`](Self::Pruned)
/// follows when pruning was attempted, and [`Finished`](Self::Finished)
/// always comes last.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Started { source: SourceId },
    SectionStarted { section: Section, page: u32 },
    PageReconciled { section: Section, page: u32, records: usize },
    SectionFinished(SectionReport),
    Pruned(PruneOutcome),
    Finished(SyncReport),
}
