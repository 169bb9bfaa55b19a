use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use reel_cache::CatalogOptions;
use reel_health::HealthPolicy;
use reel_library::ResolveOptions;
use reel_library::sync::{PruneFloor, SyncOptions};
use reel_source::adapter::{NamakadeOptions, WordPressOptions};
use reel_source::models::Section;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::APPLICATION;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}
impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = ProjectDirs::from("", "", APPLICATION)
            .map(|dirs| dirs.data_dir().join("catalog.db"))
            .unwrap_or_else(|| PathBuf::from("reel.db"));
        Self { path }
    }
}

/// Which site software a source runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    #[default]
    WordPress,
    Namakade,
}

/// One upstream site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub base_url: Url,
    #[serde(default)]
    pub adapter: AdapterKind,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "all_sections")]
    pub sections: Vec<Section>,
    #[serde(default = "default_source_timeout")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Entries per listing page on sites with fixed-length listings.
    #[serde(default)]
    pub listing_page_size: Option<u32>,
}
fn all_sections() -> Vec<Section> {
    Section::ALL.to_vec()
}
fn default_source_timeout() -> u64 {
    20_000
}
fn default_connect_timeout() -> u64 {
    10_000
}
impl SourceConfig {
    pub fn wordpress_options(&self, extract: &ExtractConfig) -> WordPressOptions {
        let defaults = WordPressOptions::default();
        WordPressOptions {
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            payload_ceiling: extract.payload_ceiling,
            sections: self.sections.clone(),
        }
    }

    pub fn namakade_options(&self, extract: &ExtractConfig) -> NamakadeOptions {
        let defaults = NamakadeOptions::default();
        NamakadeOptions {
            user_agent: self.user_agent.clone().unwrap_or_else(|| defaults.user_agent.clone()),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            payload_ceiling: extract.payload_ceiling,
            sections: self.sections.clone(),
            listing_page_size: self.listing_page_size.unwrap_or(defaults.listing_page_size),
            ..defaults
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Bytes read from any one response.
    pub payload_ceiling: usize,
    /// Budget for each pattern pass over a payload.
    pub pattern_timeout_ms: u64,
}
impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            payload_ceiling: reel_extract::MAX_PAYLOAD_BYTES,
            pattern_timeout_ms: u64::try_from(reel_extract::PATTERN_TIMEOUT.as_millis()).unwrap_or(3_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    pub request_timeout_ms: u64,
    pub form_permits: usize,
    pub form_spacing_ms: u64,
    pub max_embeds: usize,
}
impl Default for ResolveConfig {
    fn default() -> Self {
        let defaults = ResolveOptions::default();
        Self {
            request_timeout_ms: u64::try_from(defaults.request_timeout.as_millis()).unwrap_or(15_000),
            form_permits: defaults.form_permits,
            form_spacing_ms: u64::try_from(defaults.form_spacing.as_millis()).unwrap_or(500),
            max_embeds: defaults.max_embeds,
        }
    }
}
impl ResolveConfig {
    pub fn options(&self, extract: &ExtractConfig) -> ResolveOptions {
        ResolveOptions {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            pattern_timeout: Duration::from_millis(extract.pattern_timeout_ms),
            form_permits: self.form_permits,
            form_spacing: Duration::from_millis(self.form_spacing_ms),
            max_embeds: self.max_embeds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub page_size: u32,
    pub max_pages: u32,
    pub page_delay_ms: u64,
    pub prune: bool,
    pub min_items: u64,
    pub min_categories: usize,
    pub max_prune_fraction: f64,
}
impl Default for SyncConfig {
    fn default() -> Self {
        let defaults = SyncOptions::default();
        Self {
            page_size: defaults.page_size,
            max_pages: defaults.max_pages,
            page_delay_ms: u64::try_from(defaults.page_delay.as_millis()).unwrap_or(250),
            prune: defaults.prune,
            min_items: defaults.floor.min_items,
            min_categories: defaults.floor.min_categories,
            max_prune_fraction: defaults.floor.max_fraction,
        }
    }
}
impl SyncConfig {
    pub fn options(&self) -> SyncOptions {
        SyncOptions {
            page_size: self.page_size,
            max_pages: self.max_pages,
            page_delay: Duration::from_millis(self.page_delay_ms),
            prune: self.prune,
            floor: PruneFloor {
                min_items: self.min_items,
                min_categories: self.min_categories,
                max_fraction: self.max_prune_fraction,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_secs: u64,
    pub fresh_secs: u64,
    pub stripes: usize,
}
impl Default for CacheConfig {
    fn default() -> Self {
        let defaults = CatalogOptions::default();
        Self {
            capacity: defaults.capacity.get(),
            ttl_secs: defaults.ttl.as_secs(),
            fresh_secs: defaults.fresh_for.as_secs(),
            stripes: defaults.stripes,
        }
    }
}
impl CacheConfig {
    pub fn options(&self, dry_run: bool) -> CatalogOptions {
        CatalogOptions {
            capacity: NonZeroUsize::new(self.capacity).unwrap_or(NonZeroUsize::MIN),
            ttl: Duration::from_secs(self.ttl_secs),
            fresh_for: Duration::from_secs(self.fresh_secs),
            stripes: self.stripes,
            dry_run,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub failure_threshold: u32,
    pub base_suspension_secs: u64,
    pub max_suspension_secs: u64,
    pub retention_secs: u64,
    pub reason_cap: usize,
}
impl Default for HealthConfig {
    fn default() -> Self {
        let defaults = HealthPolicy::default();
        Self {
            failure_threshold: defaults.failure_threshold,
            base_suspension_secs: defaults.base_suspension.as_secs(),
            max_suspension_secs: defaults.max_suspension.as_secs(),
            retention_secs: defaults.retention.as_secs(),
            reason_cap: defaults.reason_cap,
        }
    }
}
impl HealthConfig {
    pub fn policy(&self) -> HealthPolicy {
        HealthPolicy {
            failure_threshold: self.failure_threshold,
            base_suspension: Duration::from_secs(self.base_suspension_secs),
            max_suspension: Duration::from_secs(self.max_suspension_secs),
            retention: Duration::from_secs(self.retention_secs),
            reason_cap: self.reason_cap,
        }
    }
}
