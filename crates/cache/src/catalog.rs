//! The query surface: durable store plus bounded read-through cache.

use std::collections::HashSet;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use reel_source::models::{CatalogRecord, Category, ContentId, ContentItem, Episode, SourceId};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::bounded::{BoundedCache, Lookup};
use crate::error::Result;
use crate::models::Upserted;
use crate::search::sanitize_match_query;
use crate::{Database, Repository};

/// Items as handed out by the cache.
pub type Items = Arc<[ContentItem]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Page {
        source: SourceId,
        category: Option<Category>,
        page: u32,
        page_size: u32,
    },
    Search {
        source: SourceId,
        expression: String,
        limit: u32,
    },
    Item(ContentId),
}
impl CacheKey {
    fn source(&self) -> Option<&SourceId> {
        match self {
            Self::Page { source, .. } | Self::Search { source, .. } => Some(source),
            Self::Item(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogOptions {
    pub capacity: NonZeroUsize,
    /// Entries older than this are never served.
    pub ttl: Duration,
    /// Entries older than this are served once more and refreshed behind
    /// the caller's back.
    pub fresh_for: Duration,
    /// Number of write locks that content ids are spread over.
    pub stripes: usize,
    pub dry_run: bool,
}
impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            capacity: NonZeroUsize::new(512).unwrap_or(NonZeroUsize::MIN),
            ttl: Duration::from_secs(30 * 60),
            fresh_for: Duration::from_secs(5 * 60),
            stripes: 64,
            dry_run: false,
        }
    }
}

struct Inner {
    db: Database,
    repo: Repository,
    cache: BoundedCache<CacheKey, Items>,
    /// Bumped on every invalidation; loads that started before a bump are discarded.
    generation: AtomicU64,
    stripes: Vec<tokio::sync::Mutex<()>>,
    refreshing: Mutex<HashSet<CacheKey>>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    active: RwLock<Option<SourceId>>,
}

impl Inner {
    fn store(&self, key: CacheKey, items: Items, generation: u64) {
        if self.generation.load(Ordering::SeqCst) == generation {
            self.cache.insert(key, items);
        }
    }

    fn invalidate(&self, source: &SourceId, id: Option<ContentId>) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let dropped = self.cache.retain(|key| key.source() != Some(source));
        if let Some(id) = id {
            self.cache.remove(&CacheKey::Item(id));
        }
        debug!(source = %source, dropped, "cache entries invalidated");
    }
}

/// Catalog reads and writes for the UI and the sync engine.
///
/// Reads go through a bounded cache. A stale hit is returned immediately
/// and refreshed on a task owned by the catalog; at most one refresh runs
/// per key, and [`close`](Self::close) cancels whatever is still running.
/// Writes for the same content id are serialized.
#[derive(Clone)]
pub struct Catalog {
    inner: Arc<Inner>,
}

impl Catalog {
    pub fn new(db: Database, options: CatalogOptions) -> Self {
        let repo = Repository::new(db.pool().clone(), options.dry_run);
        let stripes = (0..options.stripes.max(1)).map(|_| tokio::sync::Mutex::new(())).collect();
        Self {
            inner: Arc::new(Inner {
                db,
                repo,
                cache: BoundedCache::new(options.capacity, options.ttl, options.fresh_for),
                generation: AtomicU64::new(0),
                stripes,
                refreshing: Mutex::new(HashSet::new()),
                tasks: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                active: RwLock::new(None),
            }),
        }
    }

    /// Direct repository access, bypassing cache and write locks.
    pub fn repository(&self) -> &Repository {
        &self.inner.repo
    }

    fn stripe(&self, id: ContentId) -> &tokio::sync::Mutex<()> {
        let index = id.get().unsigned_abs() % self.inner.stripes.len() as u64;
        &self.inner.stripes[index as usize]
    }

    async fn read_through<F, Fut>(&self, key: CacheKey, load: F) -> Result<Items>
    where
        F: FnOnce(Repository) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Items>> + Send + 'static,
    {
        match self.inner.cache.get(&key) {
            Lookup::Fresh(items) => Ok(items),
            Lookup::Stale(items) => {
                self.spawn_refresh(key, load);
                Ok(items)
            },
            Lookup::Miss => {
                let generation = self.inner.generation.load(Ordering::SeqCst);
                let items = load(self.inner.repo.clone()).await?;
                self.inner.store(key, Items::clone(&items), generation);
                Ok(items)
            },
        }
    }

    fn spawn_refresh<F, Fut>(&self, key: CacheKey, load: F)
    where
        F: FnOnce(Repository) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Items>> + Send + 'static,
    {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let fresh = self.inner.refreshing.lock().unwrap_or_else(PoisonError::into_inner).insert(key.clone());
        if !fresh {
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.inner.tasks.spawn(async move {
            let generation = inner.generation.load(Ordering::SeqCst);
            tokio::select! {
                _ = inner.shutdown.cancelled() => {},
                loaded = load(inner.repo.clone()) => match loaded {
                    Ok(items) => inner.store(key.clone(), items, generation),
                    Err(error) => warn!(?key, error = %*error, "background cache refresh failed"),
                },
            }
            inner.refreshing.lock().unwrap_or_else(PoisonError::into_inner).remove(&key);
        });
    }

    /// One page of a source's items, newest first.
    pub async fn get_page(
        &self,
        source: &SourceId,
        category: Option<Category>,
        page: u32,
        page_size: u32,
    ) -> Result<Items> {
        let key = CacheKey::Page {
            source: source.clone(),
            category,
            page,
            page_size,
        };
        let source = source.clone();
        self.read_through(key, move |repo| async move {
            Ok(repo.get_page(&source, category, page, page_size).await?.into())
        })
        .await
    }

    /// Full-text search; `query` is raw user input.
    pub async fn search(&self, source: &SourceId, query: &str, limit: u32) -> Result<Items> {
        let Some(expression) = sanitize_match_query(query) else {
            return Ok(Items::from([]));
        };
        let key = CacheKey::Search {
            source: source.clone(),
            expression,
            limit,
        };
        let (source, query) = (source.clone(), query.to_string());
        self.read_through(key, move |repo| async move { Ok(repo.search(&source, &query, limit).await?.into()) })
            .await
    }

    pub async fn get_by_id(&self, id: ContentId) -> Result<Option<ContentItem>> {
        let items = self
            .read_through(CacheKey::Item(id), move |repo| async move {
                Ok(repo.get_by_id(id).await?.into_iter().collect())
            })
            .await?;
        Ok(items.first().cloned())
    }

    pub async fn episodes_for(&self, series_id: ContentId) -> Result<Vec<Episode>> {
        self.inner.repo.episodes_for(series_id).await
    }

    /// Write one catalog record under its content id's lock.
    pub async fn upsert(&self, record: &CatalogRecord) -> Result<Upserted> {
        match record {
            CatalogRecord::Item(item) => {
                let _guard = self.stripe(item.id).lock().await;
                let outcome = self.inner.repo.upsert_item(item).await?;
                if outcome != Upserted::Unchanged {
                    self.inner.invalidate(&item.source, Some(item.id));
                }
                Ok(outcome)
            },
            CatalogRecord::Episode(episode) => {
                let _guard = self.stripe(episode.series_id).lock().await;
                self.inner.repo.upsert_episode(episode).await
            },
        }
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: ContentId) -> Result<bool> {
        let _guard = self.stripe(id).lock().await;
        let Some(item) = self.inner.repo.get_by_id(id).await? else {
            return Ok(false);
        };
        let deleted = self.inner.repo.delete(id).await?;
        if deleted {
            self.inner.invalidate(&item.source, Some(id));
        }
        Ok(deleted)
    }

    pub fn active_source(&self) -> Option<SourceId> {
        self.inner.active.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Make `source` the active one and drop every cached entry that belongs
    /// to another source. Returns how many entries were dropped.
    #[instrument(skip(self), fields(source = %source))]
    pub fn switch_source(&self, source: &SourceId) -> usize {
        let previous = self.inner.active.write().unwrap_or_else(PoisonError::into_inner).replace(source.clone());
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let dropped = self.inner.cache.retain(|key| key.source() == Some(source));
        info!(previous = ?previous.as_ref().map(SourceId::as_str), dropped, "active source switched");
        dropped
    }

    /// Cancel background refreshes, wait for them to finish, then close the
    /// database.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        self.inner.cache.clear();
        self.inner.db.close().await;
    }

    #[cfg(test)]
    async fn settle(&self) {
        while !self.inner.refreshing.lock().unwrap_or_else(PoisonError::into_inner).is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::UtcDateTime;

    fn item(source: &str, slug: &str, modified: i64) -> ContentItem {
        let at = UtcDateTime::from_unix_timestamp(1_700_000_000 + modified).unwrap();
        ContentItem::new(SourceId::from(source), slug, Category::Movie, slug.to_uppercase(), at)
    }

    async fn catalog(fresh_for: Duration) -> Catalog {
        let options = CatalogOptions {
            fresh_for,
            ..CatalogOptions::default()
        };
        Catalog::new(Database::connect_in_memory().await.unwrap(), options)
    }

    #[tokio::test]
    async fn stale_hits_return_immediately_and_refresh() {
        let catalog = catalog(Duration::ZERO).await;
        let source = SourceId::from("a");
        catalog.upsert(&CatalogRecord::Item(item("a", "one", 1))).await.unwrap();
        assert_eq!(catalog.get_page(&source, None, 1, 10).await.unwrap().len(), 1);

        // Written behind the catalog's back: nothing invalidates the cache.
        catalog.repository().upsert_item(&item("a", "two", 2)).await.unwrap();
        assert_eq!(catalog.get_page(&source, None, 1, 10).await.unwrap().len(), 1);
        catalog.settle().await;
        assert_eq!(catalog.get_page(&source, None, 1, 10).await.unwrap().len(), 2);
        catalog.close().await;
    }

    #[tokio::test]
    async fn writes_invalidate_the_written_source() {
        let catalog = catalog(Duration::from_secs(60)).await;
        let (a, b) = (SourceId::from("a"), SourceId::from("b"));
        catalog.upsert(&CatalogRecord::Item(item("a", "one", 1))).await.unwrap();
        catalog.upsert(&CatalogRecord::Item(item("b", "uno", 1))).await.unwrap();
        assert_eq!(catalog.get_page(&a, None, 1, 10).await.unwrap().len(), 1);
        assert_eq!(catalog.get_page(&b, None, 1, 10).await.unwrap().len(), 1);
        assert_eq!(catalog.search(&a, "one", 10).await.unwrap().len(), 1);

        let two = item("a", "two", 2);
        catalog.upsert(&CatalogRecord::Item(two.clone())).await.unwrap();
        assert_eq!(catalog.get_page(&a, None, 1, 10).await.unwrap().len(), 2);
        assert_eq!(catalog.get_by_id(two.id).await.unwrap(), Some(two.clone()));

        assert!(catalog.delete(two.id).await.unwrap());
        assert_eq!(catalog.get_by_id(two.id).await.unwrap(), None);
        assert_eq!(catalog.get_page(&a, None, 1, 10).await.unwrap().len(), 1);
        catalog.close().await;
    }

    #[tokio::test]
    async fn switching_source_drops_other_entries() {
        let catalog = catalog(Duration::from_secs(60)).await;
        let (a, b) = (SourceId::from("a"), SourceId::from("b"));
        catalog.get_page(&a, None, 1, 10).await.unwrap();
        catalog.get_page(&a, None, 2, 10).await.unwrap();
        catalog.get_page(&b, None, 1, 10).await.unwrap();
        assert_eq!(catalog.switch_source(&b), 2);
        assert_eq!(catalog.active_source(), Some(b));
        catalog.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_to_one_id_are_serialized() {
        let catalog = catalog(Duration::from_secs(60)).await;
        let record = CatalogRecord::Item(item("a", "same", 1));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let (catalog, record) = (catalog.clone(), record.clone());
                tokio::spawn(async move { catalog.upsert(&record).await.unwrap() })
            })
            .collect();
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }
        assert_eq!(outcomes.iter().filter(|o| **o == Upserted::Inserted).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| **o == Upserted::Unchanged).count(), 15);
        catalog.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_writers_share_a_file_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("c.db")).await.unwrap();
        let catalog = Catalog::new(db, CatalogOptions::default());
        let handles: Vec<_> = (0..400)
            .map(|n| {
                let catalog = catalog.clone();
                tokio::spawn(async move {
                    let record = CatalogRecord::Item(item("a", &format!("title-{n}"), n));
                    catalog.upsert(&record).await
                })
            })
            .collect();
        let mut failures = Vec::new();
        for handle in handles {
            if let Err(error) = handle.await.unwrap() {
                failures.push(format!("{error:?}"));
            }
        }
        assert!(failures.is_empty(), "{} writes failed: {:?}", failures.len(), failures.first());
        let counts = catalog.repository().count_by_category(&SourceId::from("a")).await.unwrap();
        assert_eq!(counts.get(&Category::Movie), Some(&400));
        catalog.close().await;
    }

    #[tokio::test]
    async fn unsearchable_queries_are_empty() {
        let catalog = catalog(Duration::from_secs(60)).await;
        assert!(catalog.search(&SourceId::from("a"), "\"*-", 10).await.unwrap().is_empty());
        catalog.close().await;
    }
}
