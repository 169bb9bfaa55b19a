//! Layered configuration for reel.
//!
//! Values come from, in increasing priority: built-in defaults, one config
//! file, and `REEL_`-prefixed environment variables where `__` separates
//! nesting levels (`REEL_SYNC__PAGE_SIZE=50`).

pub mod error;
mod sections;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::sections::{
    AdapterKind, CacheConfig, DatabaseConfig, ExtractConfig, HealthConfig, ResolveConfig, SourceConfig, SyncConfig,
};

pub(crate) const APPLICATION: &str = "reel";
pub const ENV_PREFIX: &str = "REEL_";
/// File names looked for in the platform config directory, in order.
pub const FILE_NAMES: [&str; 4] = ["reel.toml", "reel.yaml", "reel.yml", "reel.json"];
/// Largest payload ceiling accepted from configuration.
pub const MAX_PAYLOAD_CEILING: usize = 9 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sources: Vec<SourceConfig>,
    pub extract: ExtractConfig,
    pub resolve: ResolveConfig,
    pub sync: SyncConfig,
    pub cache: CacheConfig,
    pub health: HealthConfig,
}

impl Config {
    /// Load and validate. `path` replaces the config file discovered in the
    /// platform config directory.
    #[instrument]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path)?)
    }

    /// The provider stack [`load`](Self::load) extracts from.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        let file = match path {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::discover(),
        };
        if let Some(file) = file {
            debug!(file = %file.display(), "reading configuration file");
            figment = merge_file(figment, &file)?;
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Config = figment.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// Platform config directory, e.g. `~/.config/reel` on Linux.
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", APPLICATION).map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn discover() -> Option<PathBuf> {
        let dir = Self::config_dir()?;
        FILE_NAMES.iter().map(|name| dir.join(name)).find(|candidate| candidate.is_file())
    }

    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|source| source.id == id)
    }

    /// Reject values that parse but cannot work. Every problem found is
    /// reported, not just the first.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        let mut ids = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                problems.push("sources: id must not be empty".to_string());
            } else if !ids.insert(source.id.as_str()) {
                problems.push(format!("sources: duplicate id {:?}", source.id));
            }
            if !matches!(source.base_url.scheme(), "http" | "https") {
                problems.push(format!("sources.{}: base_url must be http or https", source.id));
            }
            if source.sections.is_empty() {
                problems.push(format!("sources.{}: at least one section is required", source.id));
            }
            if source.adapter == AdapterKind::Namakade && !source.sections.iter().any(|s| s.category().is_some()) {
                problems.push(format!("sources.{}: namakade sources need movies or series", source.id));
            }
            if source.listing_page_size == Some(0) {
                problems.push(format!("sources.{}: listing_page_size must be at least 1", source.id));
            }
            if source.request_timeout_ms == 0 {
                problems.push(format!("sources.{}: request_timeout_ms must be positive", source.id));
            }
        }

        if self.extract.payload_ceiling == 0 || self.extract.payload_ceiling > MAX_PAYLOAD_CEILING {
            problems.push(format!("extract.payload_ceiling must be between 1 and {MAX_PAYLOAD_CEILING} bytes"));
        }
        if self.extract.pattern_timeout_ms == 0 {
            problems.push("extract.pattern_timeout_ms must be positive".to_string());
        }

        if self.resolve.form_permits == 0 {
            problems.push("resolve.form_permits must be at least 1".to_string());
        }
        if self.resolve.request_timeout_ms == 0 {
            problems.push("resolve.request_timeout_ms must be positive".to_string());
        }

        if self.sync.page_size == 0 {
            problems.push("sync.page_size must be at least 1".to_string());
        }
        if self.sync.max_pages == 0 {
            problems.push("sync.max_pages must be at least 1".to_string());
        }
        let fraction = self.sync.max_prune_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            problems.push("sync.max_prune_fraction must be in (0, 1]".to_string());
        }

        if self.cache.capacity == 0 {
            problems.push("cache.capacity must be at least 1".to_string());
        }
        if self.cache.fresh_secs > self.cache.ttl_secs {
            problems.push("cache.fresh_secs must not exceed cache.ttl_secs".to_string());
        }

        if self.health.max_suspension_secs < self.health.base_suspension_secs {
            problems.push("health.max_suspension_secs must not be below base_suspension_secs".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            exn::bail!(ErrorKind::Invalid(problems.join("; ")))
        }
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}
