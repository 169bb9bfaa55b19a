//! Durable catalog storage.
//!
//! Items, episodes, sync cursors, health records and user references share
//! one database so that pruning can check references and delete in a single
//! transaction.

use std::collections::{HashMap, HashSet};

use exn::ResultExt;
use reel_health::HealthRecord;
use reel_source::models::{Category, ContentId, ContentItem, Episode, Section, SourceId};
use sqlx::SqlitePool;
use time::UtcDateTime;
use tracing::{debug, instrument};

use crate::Database;
use crate::db::begin_write;
use crate::error::{ErrorKind, Result, is_foreign_key_violation};
use crate::models::{
    CursorRow, EpisodeRow, HealthRow, ItemRow, ReferenceKind, ReferenceRow, SyncCursor, Upserted, UserReference, timestamp,
};
use crate::search::sanitize_match_query;

/// Repository over the catalog database.
///
/// In dry-run mode every write is skipped, but upserts still report what
/// they would have done.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    dry_run: bool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
            dry_run: false,
        }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn limit(value: u32) -> i64 {
        i64::from(value)
    }

    // =========================================================================
    // Items
    // =========================================================================

    /// Insert or update an item.
    ///
    /// The stored row is only rewritten when the incoming item differs and
    /// is not older than what is stored.
    #[instrument(skip(self, item), fields(id = %item.id, source = %item.source))]
    pub async fn upsert_item(&self, item: &ContentItem) -> Result<Upserted> {
        let row = ItemRow::try_from(item)?;
        let mut tx = begin_write(&self.pool).await?;
        let existing: Option<ItemRow> = sqlx::query_as(include_str!("../queries/get_item.sql"))
            .bind(row.id)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let outcome = match existing {
            None => Upserted::Inserted,
            Some(existing) => {
                let existing = ContentItem::try_from(existing)?;
                if existing.source != item.source || existing.slug != item.slug {
                    // Same 63-bit id from a different (source, slug): refuse to overwrite.
                    exn::bail!(ErrorKind::InvalidData("content id collision"));
                }
                if existing == *item || item.last_modified < existing.last_modified {
                    Upserted::Unchanged
                } else {
                    Upserted::Updated
                }
            },
        };
        if self.dry_run || outcome == Upserted::Unchanged {
            return Ok(outcome);
        }
        let synced_at = timestamp(UtcDateTime::now());
        if outcome == Upserted::Inserted {
            sqlx::query(include_str!("../queries/insert_item.sql"))
                .bind(row.id)
                .bind(row.source)
                .bind(row.slug)
                .bind(row.category)
                .bind(row.title)
                .bind(row.year)
                .bind(row.genres)
                .bind(row.synopsis)
                .bind(row.poster)
                .bind(row.url)
                .bind(row.last_modified)
                .bind(row.complete)
                .bind(synced_at)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        } else {
            sqlx::query(include_str!("../queries/update_item.sql"))
                .bind(row.id)
                .bind(row.category)
                .bind(row.title)
                .bind(row.year)
                .bind(row.genres)
                .bind(row.synopsis)
                .bind(row.poster)
                .bind(row.url)
                .bind(row.last_modified)
                .bind(row.complete)
                .bind(synced_at)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        debug!(?outcome, "item written");
        Ok(outcome)
    }

    /// Delete an item and, by cascade, its episodes.
    ///
    /// Returns `false` if there was nothing to delete. Fails with
    /// [`ErrorKind::Referenced`] while any user reference points at it.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: ContentId) -> Result<bool> {
        if self.dry_run {
            return Ok(self.get_by_id(id).await?.is_some());
        }
        let mut tx = begin_write(&self.pool).await?;
        let referenced: bool = sqlx::query_scalar(include_str!("../queries/item_referenced.sql"))
            .bind(id.get())
            .fetch_one(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if referenced {
            exn::bail!(ErrorKind::Referenced(id));
        }
        let result = sqlx::query(include_str!("../queries/delete_item.sql")).bind(id.get()).execute(&mut *tx).await;
        let deleted = match result {
            Ok(done) => done.rows_affected() > 0,
            Err(error) if is_foreign_key_violation(&error) => {
                return Err(exn::Exn::new(error).raise(ErrorKind::Referenced(id)));
            },
            Err(error) => return Err(exn::Exn::new(error).raise(ErrorKind::Database)),
        };
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(deleted)
    }

    pub async fn get_by_id(&self, id: ContentId) -> Result<Option<ContentItem>> {
        let row: Option<ItemRow> = sqlx::query_as(include_str!("../queries/get_item.sql"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(ContentItem::try_from).transpose()
    }

    /// One page of a source's items, newest first. Pages are 1-based.
    ///
    /// A true `LIMIT`/`OFFSET` query; deep pages never load the rows before them.
    pub async fn get_page(
        &self,
        source: &SourceId,
        category: Option<Category>,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<ContentItem>> {
        let offset = i64::from(page.max(1) - 1) * i64::from(page_size);
        // One statement per shape so each walks its own index in order.
        let query = match category {
            None => sqlx::query_as(include_str!("../queries/get_page.sql")).bind(source.as_str()),
            Some(category) => sqlx::query_as(include_str!("../queries/get_page_category.sql"))
                .bind(source.as_str())
                .bind(category.as_str()),
        };
        let rows: Vec<ItemRow> = query
            .bind(Self::limit(page_size))
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(ContentItem::try_from).collect()
    }

    /// Full-text search over title, synopsis and genres.
    ///
    /// The query is sanitized here; callers pass raw user input.
    pub async fn search(&self, source: &SourceId, query: &str, limit: u32) -> Result<Vec<ContentItem>> {
        let Some(expression) = sanitize_match_query(query) else {
            return Ok(Vec::new());
        };
        let rows: Vec<ItemRow> = sqlx::query_as(include_str!("../queries/search.sql"))
            .bind(expression)
            .bind(source.as_str())
            .bind(Self::limit(limit))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(ContentItem::try_from).collect()
    }

    pub async fn count_by_category(&self, source: &SourceId) -> Result<HashMap<Category, u64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(include_str!("../queries/count_by_category.sql"))
            .bind(source.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter()
            .map(|(category, count)| {
                let category = category.parse::<Category>().or_raise(|| ErrorKind::InvalidData("category"))?;
                let count = u64::try_from(count).or_raise(|| ErrorKind::InvalidData("count"))?;
                Ok((category, count))
            })
            .collect()
    }

    pub async fn list_ids(&self, source: &SourceId) -> Result<Vec<ContentId>> {
        let ids: Vec<i64> = sqlx::query_scalar(include_str!("../queries/list_ids.sql"))
            .bind(source.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(ids.into_iter().map(ContentId::from_raw).collect())
    }

    // =========================================================================
    // Episodes
    // =========================================================================

    /// Insert or update an episode. Fails with [`ErrorKind::UnknownSeries`]
    /// when its series is not in the catalog.
    #[instrument(skip(self, episode), fields(series = %episode.series_id, season = episode.season, episode = episode.episode))]
    pub async fn upsert_episode(&self, episode: &Episode) -> Result<Upserted> {
        let row = EpisodeRow::from(episode);
        let mut tx = begin_write(&self.pool).await?;
        let existing: Option<EpisodeRow> = sqlx::query_as(include_str!("../queries/get_episode.sql"))
            .bind(row.series_id)
            .bind(row.season)
            .bind(row.episode)
            .fetch_optional(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let outcome = match existing {
            None => Upserted::Inserted,
            Some(existing) => {
                let existing = Episode::try_from(existing)?;
                if existing == *episode || episode.last_modified < existing.last_modified {
                    Upserted::Unchanged
                } else {
                    Upserted::Updated
                }
            },
        };
        if self.dry_run || outcome == Upserted::Unchanged {
            return Ok(outcome);
        }
        let result = sqlx::query(include_str!("../queries/upsert_episode.sql"))
            .bind(row.series_id)
            .bind(row.season)
            .bind(row.episode)
            .bind(row.title)
            .bind(row.url)
            .bind(row.last_modified)
            .execute(&mut *tx)
            .await;
        match result {
            Ok(_) => {},
            Err(error) if is_foreign_key_violation(&error) => {
                return Err(exn::Exn::new(error).raise(ErrorKind::UnknownSeries(episode.series_id)));
            },
            Err(error) => return Err(exn::Exn::new(error).raise(ErrorKind::Database)),
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(outcome)
    }

    pub async fn episodes_for(&self, series_id: ContentId) -> Result<Vec<Episode>> {
        let rows: Vec<EpisodeRow> = sqlx::query_as(include_str!("../queries/episodes_for.sql"))
            .bind(series_id.get())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Episode::try_from).collect()
    }

    // =========================================================================
    // Sync cursors
    // =========================================================================

    pub async fn get_cursor(&self, source: &SourceId, section: Section) -> Result<Option<SyncCursor>> {
        let row: Option<CursorRow> = sqlx::query_as(include_str!("../queries/get_cursor.sql"))
            .bind(source.as_str())
            .bind(section.as_str())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(SyncCursor::try_from).transpose()
    }

    pub async fn list_cursors(&self, source: &SourceId) -> Result<Vec<SyncCursor>> {
        let rows: Vec<CursorRow> = sqlx::query_as(include_str!("../queries/list_cursors.sql"))
            .bind(source.as_str())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(SyncCursor::try_from).collect()
    }

    #[instrument(skip(self, cursor), fields(source = %cursor.source, section = %cursor.section, page = cursor.last_page_completed))]
    pub async fn save_cursor(&self, cursor: &SyncCursor) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        let row = CursorRow::from(cursor);
        sqlx::query(include_str!("../queries/save_cursor.sql"))
            .bind(row.source)
            .bind(row.section)
            .bind(row.last_synced)
            .bind(row.last_page_completed)
            .bind(timestamp(UtcDateTime::now()))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Health
    // =========================================================================

    pub async fn load_health(&self) -> Result<Vec<HealthRecord>> {
        let rows: Vec<HealthRow> = sqlx::query_as(include_str!("../queries/load_health.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(HealthRecord::try_from).collect()
    }

    /// Replace every stored health record with `records`.
    pub async fn save_health(&self, records: &[HealthRecord]) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        let rows = records.iter().map(HealthRow::try_from).collect::<Result<Vec<_>>>()?;
        let mut tx = begin_write(&self.pool).await?;
        sqlx::query(include_str!("../queries/clear_health.sql"))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        for row in rows {
            sqlx::query(include_str!("../queries/insert_health.sql"))
                .bind(row.source)
                .bind(row.mirror)
                .bind(row.consecutive_failures)
                .bind(row.total_failures)
                .bind(row.last_success)
                .bind(row.last_failure)
                .bind(row.last_reason)
                .bind(row.suspended_until)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // User references
    // =========================================================================

    pub async fn add_reference(&self, id: ContentId, kind: ReferenceKind, position_secs: Option<u32>) -> Result<()> {
        if self.dry_run {
            return Ok(());
        }
        let result = sqlx::query(include_str!("../queries/add_reference.sql"))
            .bind(id.get())
            .bind(kind.as_str())
            .bind(position_secs.map(i64::from))
            .bind(timestamp(UtcDateTime::now()))
            .execute(&self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(error) if is_foreign_key_violation(&error) => Err(exn::Exn::new(error).raise(ErrorKind::InvalidData("unknown content id"))),
            Err(error) => Err(exn::Exn::new(error).raise(ErrorKind::Database)),
        }
    }

    pub async fn remove_reference(&self, id: ContentId, kind: ReferenceKind) -> Result<bool> {
        if self.dry_run {
            return Ok(false);
        }
        let done = sqlx::query(include_str!("../queries/remove_reference.sql"))
            .bind(id.get())
            .bind(kind.as_str())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(done.rows_affected() > 0)
    }

    /// Remove every user reference to `id`. Returns how many were removed.
    pub async fn remove_references(&self, id: ContentId) -> Result<u64> {
        if self.dry_run {
            return Ok(0);
        }
        let done = sqlx::query(include_str!("../queries/remove_references.sql"))
            .bind(id.get())
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(done.rows_affected())
    }

    pub async fn list_references(&self) -> Result<Vec<UserReference>> {
        let rows: Vec<ReferenceRow> = sqlx::query_as(include_str!("../queries/list_references.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(UserReference::try_from).collect()
    }

    /// The subset of `ids` held by at least one user reference.
    pub async fn referenced_among(&self, ids: &[ContentId]) -> Result<HashSet<ContentId>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let raw: Vec<i64> = ids.iter().map(ContentId::get).collect();
        let json = serde_json::to_string(&raw).or_raise(|| ErrorKind::InvalidData("content ids"))?;
        let found: Vec<i64> = sqlx::query_scalar(include_str!("../queries/referenced_among.sql"))
            .bind(json)
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(found.into_iter().map(ContentId::from_raw).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn at(secs: i64) -> UtcDateTime {
        UtcDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap()
    }

    fn source() -> SourceId {
        SourceId::from("site")
    }

    fn item(slug: &str, category: Category, title: &str, modified: i64) -> ContentItem {
        let mut item = ContentItem::new(source(), slug, category, title, at(modified));
        item.synopsis = format!("All about {title}.");
        item.genres = vec!["Drama".into()];
        item
    }

    async fn repo() -> Repository {
        Repository::from(&Database::connect_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn upserts_report_what_they_did() {
        let repo = repo().await;
        let mut film = item("film", Category::Movie, "Film", 10);
        assert_eq!(repo.upsert_item(&film).await.unwrap(), Upserted::Inserted);
        assert_eq!(repo.upsert_item(&film).await.unwrap(), Upserted::Unchanged);

        film.title = "Film (Director's Cut)".into();
        film.last_modified = at(20);
        assert_eq!(repo.upsert_item(&film).await.unwrap(), Upserted::Updated);

        let mut stale = film.clone();
        stale.title = "Old Title".into();
        stale.last_modified = at(5);
        assert_eq!(repo.upsert_item(&stale).await.unwrap(), Upserted::Unchanged);
        assert_eq!(repo.get_by_id(film.id).await.unwrap(), Some(film));
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::new(db.pool().clone(), true);
        let film = item("film", Category::Movie, "Film", 10);
        assert_eq!(repo.upsert_item(&film).await.unwrap(), Upserted::Inserted);
        assert_eq!(repo.get_by_id(film.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn pages_are_newest_first_and_offset() {
        let repo = repo().await;
        for i in 0..25 {
            let category = if i % 5 == 0 { Category::Series } else { Category::Movie };
            repo.upsert_item(&item(&format!("t{i}"), category, &format!("Title {i}"), i)).await.unwrap();
        }
        let first = repo.get_page(&source(), None, 1, 10).await.unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first[0].slug, "t24");
        let third = repo.get_page(&source(), None, 3, 10).await.unwrap();
        assert_eq!(third.iter().map(|i| i.slug.as_str()).collect::<Vec<_>>(), ["t4", "t3", "t2", "t1", "t0"]);
        assert!(repo.get_page(&source(), None, 1000, 20).await.unwrap().is_empty());
        let series = repo.get_page(&source(), Some(Category::Series), 1, 10).await.unwrap();
        assert_eq!(series.len(), 5);
        assert!(repo.get_page(&SourceId::from("other"), None, 1, 10).await.unwrap().is_empty());

        let counts = repo.count_by_category(&source()).await.unwrap();
        assert_eq!(counts.get(&Category::Movie), Some(&20));
        assert_eq!(counts.get(&Category::Series), Some(&5));
        assert_eq!(repo.list_ids(&source()).await.unwrap().len(), 25);
    }

    #[rstest]
    #[case("matrix", 1)]
    #[case("MATR", 1)]
    #[case("drama", 2)]
    #[case("\"", 0)]
    #[case("matrix\" OR \"", 0)]
    #[case("NOT", 0)]
    #[case("*", 0)]
    #[case("-matrix", 1)]
    #[case("AND OR NEAR(", 0)]
    #[case("reloaded)", 1)]
    #[tokio::test]
    async fn search_never_raises_syntax_errors(#[case] query: &str, #[case] hits: usize) {
        let repo = repo().await;
        repo.upsert_item(&item("the-matrix", Category::Movie, "The Matrix", 1)).await.unwrap();
        repo.upsert_item(&item("matrix-reloaded", Category::Movie, "Reloaded", 2)).await.unwrap();
        let found = repo.search(&source(), query, 20).await.unwrap();
        assert_eq!(found.len(), hits, "query {query:?}");
    }

    #[tokio::test]
    async fn search_follows_updates_and_deletes() {
        let repo = repo().await;
        let mut film = item("film", Category::Movie, "Alpha", 1);
        repo.upsert_item(&film).await.unwrap();
        film.title = "Omega".into();
        film.synopsis = "Renamed.".into();
        film.last_modified = at(2);
        repo.upsert_item(&film).await.unwrap();
        assert!(repo.search(&source(), "alpha", 10).await.unwrap().is_empty());
        assert_eq!(repo.search(&source(), "omega", 10).await.unwrap().len(), 1);
        assert!(repo.delete(film.id).await.unwrap());
        assert!(repo.search(&source(), "omega", 10).await.unwrap().is_empty());
        assert!(!repo.delete(film.id).await.unwrap());
    }

    #[tokio::test]
    async fn episodes_cascade_with_their_series() {
        let repo = repo().await;
        let show = item("show", Category::Series, "Show", 1);
        repo.upsert_item(&show).await.unwrap();
        let episode = Episode {
            series_id: show.id,
            season: 1,
            episode: 2,
            title: "Two".into(),
            url: None,
            last_modified: at(3),
        };
        assert_eq!(repo.upsert_episode(&episode).await.unwrap(), Upserted::Inserted);
        assert_eq!(repo.upsert_episode(&episode).await.unwrap(), Upserted::Unchanged);
        assert_eq!(repo.episodes_for(show.id).await.unwrap(), [episode.clone()]);

        let orphan = Episode {
            series_id: ContentId::derive(&source(), "missing"),
            ..episode
        };
        let error = repo.upsert_episode(&orphan).await.unwrap_err();
        assert_eq!(*error, ErrorKind::UnknownSeries(orphan.series_id));

        repo.delete(show.id).await.unwrap();
        assert!(repo.episodes_for(show.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn referenced_items_cannot_be_deleted() {
        let repo = repo().await;
        let kept = item("kept", Category::Movie, "Kept", 1);
        let loose = item("loose", Category::Movie, "Loose", 1);
        repo.upsert_item(&kept).await.unwrap();
        repo.upsert_item(&loose).await.unwrap();
        repo.add_reference(kept.id, ReferenceKind::Watchlist, None).await.unwrap();
        repo.add_reference(kept.id, ReferenceKind::Progress, Some(600)).await.unwrap();

        let referenced = repo.referenced_among(&[kept.id, loose.id]).await.unwrap();
        assert_eq!(referenced, HashSet::from([kept.id]));
        let error = repo.delete(kept.id).await.unwrap_err();
        assert_eq!(*error, ErrorKind::Referenced(kept.id));
        assert_eq!(repo.list_references().await.unwrap().len(), 2);

        assert_eq!(repo.remove_references(kept.id).await.unwrap(), 2);
        assert!(repo.delete(kept.id).await.unwrap());
    }

    #[tokio::test]
    async fn restrict_violations_are_recognised() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let kept = item("kept", Category::Movie, "Kept", 1);
        repo.upsert_item(&kept).await.unwrap();
        repo.add_reference(kept.id, ReferenceKind::Watchlist, None).await.unwrap();
        // Straight to SQLite, past the reference check in `delete`.
        let error = sqlx::query(include_str!("../queries/delete_item.sql"))
            .bind(kept.id.get())
            .execute(db.pool())
            .await
            .unwrap_err();
        assert!(is_foreign_key_violation(&error), "{error}");
    }

    #[rstest]
    #[case::listing(include_str!("../queries/get_page.sql"), None, "content_items_listing")]
    #[case::category(include_str!("../queries/get_page_category.sql"), Some("movie"), "content_items_category")]
    #[tokio::test]
    async fn pages_walk_an_index_without_sorting(#[case] query: &str, #[case] category: Option<&str>, #[case] index: &str) {
        let db = Database::connect_in_memory().await.unwrap();
        let explain = format!("EXPLAIN QUERY PLAN {query}");
        let mut plan = sqlx::query_as::<_, (i64, i64, i64, String)>(&explain).bind("site");
        if let Some(category) = category {
            plan = plan.bind(category);
        }
        let plan = plan
            .bind(20_i64)
            .bind(8_000_i64)
            .fetch_all(db.pool())
            .await
            .unwrap();
        let details: Vec<&str> = plan.iter().map(|(_, _, _, detail)| detail.as_str()).collect();
        assert!(details.iter().any(|d| d.contains(index)), "{details:?}");
        assert!(!details.iter().any(|d| d.contains("TEMP B-TREE")), "{details:?}");
    }

    #[tokio::test]
    async fn deep_pages_match_their_offset() {
        let repo = repo().await;
        for n in 0..600 {
            let category = if n % 3 == 0 { Category::Series } else { Category::Movie };
            repo.upsert_item(&item(&format!("title-{n:04}"), category, "Title", n)).await.unwrap();
        }
        let last = repo.get_page(&source(), None, 30, 20).await.unwrap();
        assert_eq!(last.len(), 20);
        assert_eq!(last[0].slug, "title-0019");
        assert_eq!(last[19].slug, "title-0000");
        assert!(repo.get_page(&source(), None, 31, 20).await.unwrap().is_empty());
        let series = repo.get_page(&source(), Some(Category::Series), 10, 20).await.unwrap();
        assert_eq!(series.len(), 20);
        assert!(series.iter().all(|s| s.category == Category::Series));
        assert_eq!(series[19].slug, "title-0000");
    }

    #[tokio::test]
    async fn cursors_are_per_source_and_section() {
        let repo = repo().await;
        assert_eq!(repo.get_cursor(&source(), Section::Movies).await.unwrap(), None);
        let mut cursor = SyncCursor::new(source(), Section::Movies);
        cursor.last_page_completed = 3;
        cursor.last_synced = Some(at(99));
        repo.save_cursor(&cursor).await.unwrap();
        repo.save_cursor(&SyncCursor::new(source(), Section::Episodes)).await.unwrap();
        assert_eq!(repo.get_cursor(&source(), Section::Movies).await.unwrap(), Some(cursor.clone()));
        assert_eq!(repo.list_cursors(&source()).await.unwrap().len(), 2);

        cursor.last_page_completed = 0;
        repo.save_cursor(&cursor).await.unwrap();
        assert_eq!(repo.get_cursor(&source(), Section::Movies).await.unwrap().unwrap().next_page(), 1);
    }

    #[tokio::test]
    async fn health_is_replaced_wholesale() {
        let repo = repo().await;
        let mut record = HealthRecord::new("site", "cdn.example.com");
        record.consecutive_failures = 2;
        record.total_failures = 7;
        record.last_failure = Some(at(5));
        record.last_reason = Some("reset".into());
        repo.save_health(&[record.clone(), HealthRecord::new("site", "*")]).await.unwrap();
        assert_eq!(repo.load_health().await.unwrap().len(), 2);
        repo.save_health(std::slice::from_ref(&record)).await.unwrap();
        assert_eq!(repo.load_health().await.unwrap(), [record]);
    }
}
