//! One function per subcommand. Listings are written as JSON lines so an
//! external scheduler can consume them; sync summaries are plain text.

use std::io::Write;

use exn::ResultExt;
use reel_library::sync::SectionOutcome;
use reel_library::{Resolver, SyncEngine, SyncReport};
use reel_source::models::{Category, SourceId};
use serde::Serialize;
use tracing::{info, instrument, warn};
use url::Url;

use crate::app::App;
use crate::error::{ErrorKind, Result};

fn emit<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value).or_raise(|| ErrorKind::Output)?;
    writeln!(out).or_raise(|| ErrorKind::Output)
}

/// Sync the named sources (all when empty). Returns `true` when every
/// section of every source completed.
#[instrument(skip(app, out))]
pub async fn sync<W: Write>(app: &App, ids: &[String], out: &mut W) -> Result<bool> {
    let sources = app.sources(ids)?;
    let engine = SyncEngine::new(app.catalog.clone(), app.health.clone(), app.config.sync.options());

    let token = engine.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after the current page");
            token.cancel();
        }
    });
    let reports = engine.run_all(&sources).await;
    interrupt.abort();

    for report in &reports {
        write_report(out, report)?;
    }
    Ok(reports.iter().all(SyncReport::is_complete))
}

fn write_report<W: Write>(out: &mut W, report: &SyncReport) -> Result<()> {
    for section in &report.sections {
        let outcome = match &section.outcome {
            SectionOutcome::Completed if section.hit_ceiling => "completed (page ceiling)".to_string(),
            SectionOutcome::Completed => "completed".to_string(),
            SectionOutcome::Failed { page, reason } => format!("failed at page {page}: {reason}"),
            SectionOutcome::Cancelled { page } => format!("cancelled at page {page}"),
            SectionOutcome::Suspended => "suspended".to_string(),
        };
        writeln!(
            out,
            "{} {}: {outcome}; pages {}..{} inserted {} updated {} unchanged {} failed {}",
            report.source,
            section.section,
            section.first_page,
            section.first_page + section.pages,
            section.inserted,
            section.updated,
            section.unchanged,
            section.failed,
        )
        .or_raise(|| ErrorKind::Output)?;
    }
    if let Some(prune) = &report.prune {
        writeln!(out, "{} prune: {prune:?}", report.source).or_raise(|| ErrorKind::Output)?;
    }
    Ok(())
}

/// Print one page of the local catalog.
pub async fn page<W: Write>(
    app: &App,
    source: Option<&str>,
    category: Option<Category>,
    page: u32,
    page_size: u32,
    out: &mut W,
) -> Result<usize> {
    let source = source_id(app, source)?;
    app.catalog.switch_source(&source);
    let items = app.catalog.get_page(&source, category, page, page_size).await.or_raise(|| ErrorKind::Catalog)?;
    for item in items.iter() {
        emit(out, item)?;
    }
    Ok(items.len())
}

/// Full-text search over the local catalog.
pub async fn search<W: Write>(app: &App, source: Option<&str>, query: &str, limit: u32, out: &mut W) -> Result<usize> {
    let source = source_id(app, source)?;
    app.catalog.switch_source(&source);
    let items = app.catalog.search(&source, query, limit).await.or_raise(|| ErrorKind::Catalog)?;
    for item in items.iter() {
        emit(out, item)?;
    }
    Ok(items.len())
}

/// Resolve a content page into playable candidates, best first. Returns
/// `false` when nothing playable was found.
#[instrument(skip(app, url, out), fields(url = %url))]
pub async fn resolve<W: Write>(app: &App, source: Option<&str>, url: &Url, out: &mut W) -> Result<bool> {
    let source = app.source(source)?;
    let resolver = Resolver::new(app.health.clone(), app.config.resolve.options(&app.config.extract));
    let resolution = resolver.resolve(&source, url).await;
    for failure in &resolution.failures {
        warn!(reference = %failure.reference, error = %failure.kind, "reference failed");
    }
    for candidate in &resolution.candidates {
        emit(out, candidate)?;
    }
    info!(candidates = resolution.candidates.len(), partial = resolution.partial, "resolved");
    Ok(!resolution.is_empty())
}

/// Print every health record the tracker knows about.
pub fn health<W: Write>(app: &App, out: &mut W) -> Result<usize> {
    let records = app.health.snapshot();
    for record in &records {
        emit(out, record)?;
    }
    Ok(records.len())
}

fn source_id(app: &App, id: Option<&str>) -> Result<SourceId> {
    match id {
        Some(id) if app.config.source(id).is_some() => Ok(SourceId::from(id)),
        Some(id) => exn::bail!(ErrorKind::UnknownSource(id.to_string())),
        None => match app.config.sources.first() {
            Some(first) => Ok(SourceId::from(first.id.as_str())),
            None => exn::bail!(ErrorKind::NoSources),
        },
    }
}
