//! Source adapter trait and implementations.
//!
//! Everything site-specific (endpoint shapes, headers, form submission) lives
//! behind [`SourceAdapter`]. The rest of the system only sees references,
//! payloads and catalog pages.

#[cfg(feature = "mock")]
mod mock;
mod http;
mod namakade;
mod wordpress;

#[cfg(feature = "mock")]
pub use self::mock::{MockFailure, MockSource};
pub use self::namakade::{NamakadeOptions, NamakadeSource};
pub use self::wordpress::{WordPressOptions, WordPressSource};
use crate::error::Result;
use crate::models::{ContentRef, Page, PageRequest, Payload, Section, SourceId};
use async_trait::async_trait;
use reel_extract::models::SourceKind;

/// Unified interface for one upstream site.
///
/// # Examples
///
/// ```
/// use reel_source::{SourceAdapter, error::Result};
/// use reel_source::models::{PageRequest, Section};
///
/// async fn first_movie_page(source: &dyn SourceAdapter) -> Result<usize> {
///     let request = PageRequest { section: Section::Movies, page: 1, page_size: 20 };
///     Ok(source.fetch_page(&request).await?.records.len())
/// }
/// ```
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Name of the configured source. Used for content identity, cursors
    /// and health records.
    fn id(&self) -> &SourceId;

    /// Catalog sections this source serves, in sync order.
    fn sections(&self) -> &[Section];

    /// Payload shape a response to `reference` will have.
    fn extraction_kind(&self, reference: &ContentRef) -> SourceKind;

    /// Fetch the raw bytes behind a reference, bounded by the adapter's
    /// payload ceiling.
    async fn fetch(&self, reference: &ContentRef) -> Result<Payload>;

    /// Fetch one catalog page.
    ///
    /// A page past the end is an empty page, not an error.
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page>;
}
