use reel_cache::models::Upserted;
use reel_source::models::{Section, SourceId};
use time::UtcDateTime;

use super::error::GuardReason;

/// How one section's run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionOutcome {
    /// Reached the end of the listing, or the page ceiling.
    Completed,
    /// A page could not be fetched or its cursor could not be saved. The
    /// cursor still points at the last fully reconciled page.
    Failed { page: u32, reason: String },
    /// Stopped on request before `page` finished.
    Cancelled { page: u32 },
    /// The source is backing off after repeated failures; nothing was fetched.
    Suspended,
}

/// Counters and outcome for one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionReport {
    pub section: Section,
    pub outcome: SectionOutcome,
    /// Page the run started from. Anything above 1 is a resumed pass.
    pub first_page: u32,
    /// Pages fully reconciled in this run.
    pub pages: u32,
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    /// Records whose write failed and were skipped.
    pub failed: u64,
    /// The pass stopped at the page ceiling rather than at the end of the listing.
    pub hit_ceiling: bool,
}
impl SectionReport {
    pub(crate) fn new(section: Section, first_page: u32) -> Self {
        Self {
            section,
            outcome: SectionOutcome::Completed,
            first_page,
            pages: 0,
            inserted: 0,
            updated: 0,
            unchanged: 0,
            failed: 0,
            hit_ceiling: false,
        }
    }

    pub(crate) fn suspended(section: Section, first_page: u32) -> Self {
        Self {
            outcome: SectionOutcome::Suspended,
            ..Self::new(section, first_page)
        }
    }

    pub(crate) fn count(&mut self, upserted: Upserted) {
        match upserted {
            Upserted::Inserted => self.inserted += 1,
            Upserted::Updated => self.updated += 1,
            Upserted::Unchanged => self.unchanged += 1,
        }
    }

    /// Whether this run walked the whole listing from the newest page.
    pub fn is_full_pass(&self) -> bool {
        self.outcome == SectionOutcome::Completed && self.first_page == 1 && !self.hit_ceiling
    }
}

/// What a prune pass did, or why it did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    Pruned(PruneReport),
    Refused(GuardReason),
    /// The store failed partway; whatever was removed before stays removed.
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Orphans found locally but not upstream.
    pub orphans: u64,
    /// Unreferenced orphans removed from the catalog.
    pub deleted: u64,
    /// Referenced orphans whose user references were removed. Their catalog
    /// rows stay.
    pub ghosted: u64,
}

/// Result of one source's sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub source: SourceId,
    pub sections: Vec<SectionReport>,
    /// `None` when pruning was not attempted.
    pub prune: Option<PruneOutcome>,
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
}
impl SyncReport {
    /// Every section reached the end of its listing.
    pub fn is_complete(&self) -> bool {
        self.sections.iter().all(|section| section.outcome == SectionOutcome::Completed)
    }

    pub fn is_suspended(&self) -> bool {
        !self.sections.is_empty() && self.sections.iter().all(|section| section.outcome == SectionOutcome::Suspended)
    }

    pub fn section(&self, section: Section) -> Option<&SectionReport> {
        self.sections.iter().find(|report| report.section == section)
    }

    pub fn inserted(&self) -> u64 {
        self.sections.iter().map(|section| section.inserted).sum()
    }

    pub fn updated(&self) -> u64 {
        self.sections.iter().map(|section| section.updated).sum()
    }

    pub fn failed(&self) -> u64 {
        self.sections.iter().map(|section| section.failed).sum()
    }
}
