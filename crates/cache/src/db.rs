//! Catalog database: one SQLite file in WAL mode shared by the sync engine's
//! writers and the UI's readers.

use std::path::Path;
use std::time::Duration;

use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, Transaction};
use tracing::{debug, instrument};

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Tables (and the FTS index) every catalog database must have once migrated.
const CATALOG_TABLES: [&str; 6] =
    ["content_items", "content_search", "episodes", "sync_cursors", "health_records", "user_references"];

/// Readers (page, search, refresh tasks) plus the writers of concurrent syncs.
const MAX_CONNECTIONS: u32 = 8;
/// How long a writer queues for the WAL write lock before giving up.
const WRITE_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    async fn open(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let db = Self { pool };
        MIGRATOR.run(&db.pool).await.or_raise(|| ErrorKind::Migration)?;
        db.verify_schema().await?;
        Ok(db)
    }

    /// Open (or create) the catalog database at `path` and migrate it.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::options().filename(path.as_ref()).create_if_missing(true);
        Self::open(options, MAX_CONNECTIONS).await
    }

    /// A private in-memory catalog. Other crates use it in their tests.
    pub async fn connect_in_memory() -> Result<Self> {
        // Each connection to ":memory:" is its own database, so keep one.
        Self::open(Self::options().filename(":memory:"), 1).await
    }

    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            // Episode cascades and reference restrictions need this.
            .foreign_keys(true)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(WRITE_WAIT)
            // FTS merges and sorted listings stay off disk.
            .pragma("temp_store", "memory")
            .pragma("cache_size", "-16384")
            .optimize_on_close(true, None)
    }

    /// Fail fast on a database whose migrations ran but left pieces missing,
    /// e.g. an SQLite build without FTS5.
    async fn verify_schema(&self) -> Result<()> {
        let found: Vec<String> = sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table'")
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Migration)?;
        for table in CATALOG_TABLES {
            if !found.iter().any(|name| name == table) {
                exn::bail!(ErrorKind::Migration);
            }
        }
        debug!(migrations = MIGRATOR.iter().count(), "catalog schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Start a write transaction that takes the write lock up front.
///
/// A deferred transaction that reads first and writes later fails outright
/// with `SQLITE_BUSY_SNAPSHOT` when another connection committed in between;
/// `BEGIN IMMEDIATE` queues on the busy timeout instead.
pub(crate) async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE").await.or_raise(|| ErrorKind::Database)
}
