use std::sync::Arc;

use exn::{OptionExt, ResultExt};
use reel_cache::{Catalog, Database};
use reel_config::{AdapterKind, Config, ExtractConfig, SourceConfig};
use reel_health::HealthTracker;
use reel_source::SourceHandle;
use reel_source::adapter::{NamakadeSource, WordPressSource};
use tracing::{debug, instrument};

use crate::error::{ErrorKind, Result};

/// Everything a command needs: configuration, the catalog store and the
/// health tracker restored from it.
pub struct App {
    pub config: Config,
    pub catalog: Catalog,
    pub health: Arc<HealthTracker>,
}

impl App {
    /// Open the configured database, creating its directory if needed.
    #[instrument(skip_all, fields(database = %config.database.path.display()))]
    pub async fn open(config: Config, dry_run: bool) -> Result<Self> {
        let path = config.database.path.clone();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Catalog)?;
        }
        let db = Database::connect(&path).await.or_raise(|| ErrorKind::Catalog)?;
        Self::with_database(config, db, dry_run).await
    }

    pub async fn with_database(config: Config, db: Database, dry_run: bool) -> Result<Self> {
        let catalog = Catalog::new(db, config.cache.options(dry_run));
        let health = Arc::new(HealthTracker::new(config.health.policy()));
        reel_library::restore_health(&catalog, &health).await.or_raise(|| ErrorKind::Health)?;
        Ok(Self { config, catalog, health })
    }

    /// The source named `id`, or the first configured one.
    pub fn source(&self, id: Option<&str>) -> Result<SourceHandle> {
        let config = match id {
            Some(id) => self.config.source(id).ok_or_raise(|| ErrorKind::UnknownSource(id.to_string()))?,
            None => self.config.sources.first().ok_or_raise(|| ErrorKind::NoSources)?,
        };
        build_source(config, &self.config.extract)
    }

    /// The sources named in `ids`, or every configured source when empty.
    pub fn sources(&self, ids: &[String]) -> Result<Vec<SourceHandle>> {
        if self.config.sources.is_empty() {
            exn::bail!(ErrorKind::NoSources);
        }
        if ids.is_empty() {
            return self.config.sources.iter().map(|config| build_source(config, &self.config.extract)).collect();
        }
        ids.iter().map(|id| self.source(Some(id))).collect()
    }

    /// Persist health and close the catalog.
    pub async fn close(self) -> Result<()> {
        let persisted = reel_library::persist_health(&self.catalog, &self.health).await;
        self.catalog.close().await;
        let persisted = persisted.or_raise(|| ErrorKind::Health)?;
        debug!(persisted, "health records persisted");
        Ok(())
    }
}

fn build_source(config: &SourceConfig, extract: &ExtractConfig) -> Result<SourceHandle> {
    let (id, base) = (config.id.as_str(), config.base_url.as_str());
    let source = match config.adapter {
        AdapterKind::WordPress => {
            WordPressSource::new(id, base, config.wordpress_options(extract)).map(|s| Arc::new(s) as SourceHandle)
        },
        AdapterKind::Namakade => {
            NamakadeSource::new(id, base, config.namakade_options(extract)).map(|s| Arc::new(s) as SourceHandle)
        },
    };
    source.or_raise(|| ErrorKind::Source(config.id.clone()))
}
