//! Scripted in-memory source for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reel_extract::models::SourceKind;
use tokio::sync::RwLock;

use super::SourceAdapter;
use crate::error::{ErrorKind, Result};
use crate::models::{CatalogRecord, ContentRef, Page, PageRequest, Payload, Section, SourceId};

/// A failure to inject into a [`MockSource`].
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Every request for this page fails.
    Page { section: Section, page: u32, kind: ErrorKind },
    /// The next `count` calls, pages or fetches, fail.
    Next { count: usize, kind: ErrorKind },
    /// Every fetch of this reference fails.
    Fetch { reference: ContentRef, kind: ErrorKind },
}

#[derive(Default)]
struct Script {
    records: HashMap<Section, Vec<CatalogRecord>>,
    payloads: HashMap<String, Payload>,
    kinds: HashMap<String, SourceKind>,
    page_failures: HashMap<(Section, u32), ErrorKind>,
    rejected: HashMap<(Section, u32), usize>,
    always_more: bool,
    fetch_failures: HashMap<String, ErrorKind>,
    next_failures: Vec<ErrorKind>,
}

/// Scripted source adapter.
///
/// Each section holds a flat record list served in `page_size` slices, and
/// a page is terminal once it comes back short, the same way a WordPress
/// listing without a page-count header behaves. Payloads are keyed by the
/// reference's display form.
///
/// # Examples
///
/// ```
/// use reel_source::adapter::MockSource;
/// use reel_source::models::{ContentRef, PageRequest, Section};
/// use reel_source::SourceAdapter;
/// use url::Url;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let page = ContentRef::Page(Url::parse("https://site.example.com/movies/x/")?);
/// let source = MockSource::new("mock").with_payload(&page, "<video src=\"https://cdn.example.com/x.mp4\">");
/// assert!(!source.fetch(&page).await?.is_empty());
///
/// let request = PageRequest { section: Section::Movies, page: 1, page_size: 10 };
/// assert!(source.fetch_page(&request).await?.is_terminal(request.page_size));
/// # Ok(())
/// # }
/// ```
pub struct MockSource {
    id: SourceId,
    sections: Vec<Section>,
    latency: Option<Duration>,
    script: RwLock<Script>,
    page_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl MockSource {
    pub fn new(id: impl Into<SourceId>) -> Self {
        Self {
            id: id.into(),
            sections: Section::ALL.to_vec(),
            latency: None,
            script: RwLock::new(Script::default()),
            page_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_sections(mut self, sections: impl IntoIterator<Item = Section>) -> Self {
        self.sections = sections.into_iter().collect();
        self
    }

    /// Sleep this long before answering any call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_records(mut self, section: Section, records: impl IntoIterator<Item = CatalogRecord>) -> Self {
        self.script.get_mut().records.insert(section, records.into_iter().collect());
        self
    }

    pub fn with_payload(mut self, reference: &ContentRef, bytes: impl Into<Vec<u8>>) -> Self {
        self.script.get_mut().payloads.insert(reference.to_string(), Payload::new(bytes));
        self
    }

    /// Answer `reference` with an already-built payload, e.g. one marked truncated.
    pub fn with_raw_payload(mut self, reference: &ContentRef, payload: Payload) -> Self {
        self.script.get_mut().payloads.insert(reference.to_string(), payload);
        self
    }

    /// Override the extraction kind reported for `reference`.
    pub fn with_kind(mut self, reference: &ContentRef, kind: SourceKind) -> Self {
        self.script.get_mut().kinds.insert(reference.to_string(), kind);
        self
    }

    /// Report `count` unusable entries alongside page `page` of `section`.
    pub fn with_rejected(mut self, section: Section, page: u32, count: usize) -> Self {
        self.script.get_mut().rejected.insert((section, page), count);
        self
    }

    /// Claim a further page on every listing, like a source whose page
    /// count header is wrong.
    pub fn advertising_more_pages(mut self) -> Self {
        self.script.get_mut().always_more = true;
        self
    }

    pub fn with_failure(mut self, failure: MockFailure) -> Self {
        Self::apply(self.script.get_mut(), failure);
        self
    }

    /// Replace a section's records, e.g. to simulate upstream deletions
    /// between two syncs.
    pub async fn set_records(&self, section: Section, records: impl IntoIterator<Item = CatalogRecord>) {
        self.script.write().await.records.insert(section, records.into_iter().collect());
    }

    pub async fn inject(&self, failure: MockFailure) {
        Self::apply(&mut *self.script.write().await, failure);
    }

    /// Remove every injected failure.
    pub async fn heal(&self) {
        let mut script = self.script.write().await;
        script.page_failures.clear();
        script.fetch_failures.clear();
        script.next_failures.clear();
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn apply(script: &mut Script, failure: MockFailure) {
        match failure {
            MockFailure::Page { section, page, kind } => {
                script.page_failures.insert((section, page), kind);
            },
            MockFailure::Next { count, kind } => {
                script.next_failures.extend(std::iter::repeat_n(kind, count));
            },
            MockFailure::Fetch { reference, kind } => {
                script.fetch_failures.insert(reference.to_string(), kind);
            },
        }
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SourceAdapter for MockSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn sections(&self) -> &[Section] {
        &self.sections
    }

    fn extraction_kind(&self, reference: &ContentRef) -> SourceKind {
        if let Ok(script) = self.script.try_read()
            && let Some(kind) = script.kinds.get(&reference.to_string())
        {
            return *kind;
        }
        match reference {
            ContentRef::Player(_) => SourceKind::PlayerApi,
            ContentRef::Page(_) | ContentRef::Form { .. } => SourceKind::Markup,
        }
    }

    async fn fetch(&self, reference: &ContentRef) -> Result<Payload> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        let key = reference.to_string();
        let mut script = self.script.write().await;
        if let Some(kind) = script.next_failures.pop() {
            exn::bail!(kind);
        }
        if let Some(kind) = script.fetch_failures.get(&key) {
            exn::bail!(kind.clone());
        }
        match script.payloads.get(&key) {
            Some(payload) => Ok(payload.clone()),
            None => exn::bail!(ErrorKind::NotFound(key)),
        }
    }

    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if !self.sections.contains(&request.section) {
            exn::bail!(ErrorKind::Unsupported(request.section.as_str()));
        }
        let mut script = self.script.write().await;
        if let Some(kind) = script.next_failures.pop() {
            exn::bail!(kind);
        }
        if let Some(kind) = script.page_failures.get(&(request.section, request.page)) {
            exn::bail!(kind.clone());
        }
        let records = script.records.get(&request.section).map(Vec::as_slice).unwrap_or_default();
        let size = request.page_size.max(1) as usize;
        let start = (request.page.max(1) as usize - 1).saturating_mul(size);
        let slice = records.get(start..).unwrap_or_default();
        let slice = &slice[..slice.len().min(size)];
        let rejected = script.rejected.get(&(request.section, request.page)).copied().unwrap_or_default();
        Ok(Page {
            records: slice.to_vec(),
            rejected,
            has_more: script.always_more || slice.len() + rejected >= size,
        })
    }
}
