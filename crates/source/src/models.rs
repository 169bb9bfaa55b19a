//! Catalog data model shared by adapters, the cache and the sync engine.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use reel_extract::models::{PlayForm, PlayerOption};
use serde::{Deserialize, Serialize};
use time::UtcDateTime;
use url::Url;

use crate::error::{Error, ErrorKind};

/// Name of a configured source. Unique per deployment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);
impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl Display for SourceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
impl From<&str> for SourceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
impl From<String> for SourceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
impl AsRef<str> for SourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stable identity of a catalog item.
///
/// Derived from the source name and the item's external slug with BLAKE3, so
/// the same item gets the same id in every process, on every platform, on
/// every run. Always non-negative so it fits an SQLite `INTEGER` key as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(i64);
impl ContentId {
    pub fn derive(source: &SourceId, slug: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(source.as_str().as_bytes());
        hasher.update(&[0]);
        hasher.update(slug.trim().to_lowercase().as_bytes());
        let digest = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        Self((u64::from_be_bytes(head) & (i64::MAX as u64)) as i64)
    }

    /// Wrap a value read back from storage.
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}
impl Display for ContentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}
impl FromStr for ContentId {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<i64>() {
            Ok(raw) if raw >= 0 => Ok(Self(raw)),
            _ => exn::bail!(ErrorKind::Malformed(format!("content id: {s}"))),
        }
    }
}

/// What a catalog item is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Movie,
    Series,
}
impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
        }
    }
}
impl FromStr for Category {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" | "movies" => Ok(Self::Movie),
            "series" | "tv" | "tvshow" | "tvshows" => Ok(Self::Series),
            _ => exn::bail!(ErrorKind::Malformed(format!("category: {s}"))),
        }
    }
}
impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// An independently paginated part of a source's catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Movies,
    Series,
    Episodes,
}
impl Section {
    /// In dependency order: episodes reference series.
    pub const ALL: [Section; 3] = [Self::Movies, Self::Series, Self::Episodes];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movies => "movies",
            Self::Series => "series",
            Self::Episodes => "episodes",
        }
    }

    /// The item category this section yields, if it yields items at all.
    pub fn category(&self) -> Option<Category> {
        match self {
            Self::Movies => Some(Category::Movie),
            Self::Series => Some(Category::Series),
            Self::Episodes => None,
        }
    }
}
impl FromStr for Section {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movies" | "movie" => Ok(Self::Movies),
            "series" | "tvshows" | "tv" => Ok(Self::Series),
            "episodes" | "episode" => Ok(Self::Episodes),
            _ => exn::bail!(ErrorKind::Malformed(format!("section: {s}"))),
        }
    }
}
impl Display for Section {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// A movie or a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentId,
    pub source: SourceId,
    pub slug: String,
    pub category: Category,
    pub title: String,
    pub year: Option<u16>,
    pub genres: Vec<String>,
    pub synopsis: String,
    pub poster: Option<String>,
    pub url: Option<String>,
    /// Last-modified timestamp as reported by the source.
    pub last_modified: UtcDateTime,
    /// Whether the source supplied everything a listing needs.
    pub complete: bool,
}
impl ContentItem {
    /// A minimal item; the id is derived from `source` and `slug`.
    pub fn new(
        source: SourceId,
        slug: impl Into<String>,
        category: Category,
        title: impl Into<String>,
        last_modified: UtcDateTime,
    ) -> Self {
        let slug = slug.into();
        Self {
            id: ContentId::derive(&source, &slug),
            source,
            slug,
            category,
            title: title.into(),
            year: None,
            genres: Vec::new(),
            synopsis: String::new(),
            poster: None,
            url: None,
            last_modified,
            complete: false,
        }
    }

    /// Recompute [`complete`](Self::complete) from the populated fields.
    pub fn refresh_completeness(&mut self) {
        self.complete =
            !self.title.is_empty() && !self.synopsis.is_empty() && self.poster.is_some() && self.year.is_some();
    }
}

/// Identity of an episode. Never derived from display strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EpisodeKey {
    pub series_id: ContentId,
    pub season: u32,
    pub episode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub series_id: ContentId,
    pub season: u32,
    pub episode: u32,
    pub title: String,
    pub url: Option<String>,
    pub last_modified: UtcDateTime,
}
impl Episode {
    pub fn key(&self) -> EpisodeKey {
        EpisodeKey {
            series_id: self.series_id,
            season: self.season,
            episode: self.episode,
        }
    }
}

/// One record of a catalog page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CatalogRecord {
    Item(ContentItem),
    Episode(Episode),
}
impl CatalogRecord {
    pub fn last_modified(&self) -> UtcDateTime {
        match self {
            Self::Item(item) => item.last_modified,
            Self::Episode(episode) => episode.last_modified,
        }
    }
}

/// Which page of which section to fetch. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    pub section: Section,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<CatalogRecord>,
    /// Entries the source listed that could not be turned into records.
    pub rejected: usize,
    /// The source claims there are further pages.
    pub has_more: bool,
}
impl Page {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Entries the source returned, usable or not.
    pub fn listed(&self) -> usize {
        self.records.len() + self.rejected
    }

    /// Whether this is the last page of a walk asking for `page_size`
    /// entries at a time. A short page ends the walk whatever the source
    /// claims about further pages.
    pub fn is_terminal(&self, page_size: u32) -> bool {
        !self.has_more || self.listed() < page_size as usize
    }
}

/// What the core asks an adapter to fetch. The adapter builds the concrete
/// request (method, headers, endpoint shape).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    /// A plain page: a content page, a play page or an embedded player.
    Page(Url),
    /// A play form found on `page`, submitted with `page` as the referer.
    Form { page: Url, form: PlayForm },
    /// One player option, resolved through the player API.
    Player(PlayerOption),
}
impl Display for ContentRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Page(url) => write!(f, "page {url}"),
            Self::Form { form, .. } => write!(f, "form watch-{}", form.post_id),
            Self::Player(option) => write!(f, "player {}/{}", option.post_id, option.nume),
        }
    }
}

/// Raw bytes of one response, read up to a ceiling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Vec<u8>,
    /// Reading stopped at the ceiling; the body may have been longer.
    pub truncated: bool,
    /// What the transport claimed, for logging only.
    pub declared_length: Option<u64>,
}
impl Payload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn content_ids_are_deterministic() {
        let source = SourceId::from("farsiland");
        let a = ContentId::derive(&source, "the-film");
        let b = ContentId::derive(&SourceId::from("farsiland".to_string()), "the-film");
        assert_eq!(a, b);
        assert!(a.get() >= 0);
        // Slugs are normalised before hashing.
        assert_eq!(a, ContentId::derive(&source, " The-Film "));
    }

    #[test]
    fn content_ids_separate_sources_and_slugs() {
        let one = ContentId::derive(&SourceId::from("a"), "bc");
        let two = ContentId::derive(&SourceId::from("ab"), "c");
        assert_ne!(one, two);
        assert_ne!(
            ContentId::derive(&SourceId::from("a"), "x"),
            ContentId::derive(&SourceId::from("a"), "y")
        );
    }

    #[rstest]
    #[case("movies", Section::Movies)]
    #[case("tvshows", Section::Series)]
    #[case(" Episodes ", Section::Episodes)]
    fn parses_sections(#[case] input: &str, #[case] expected: Section) {
        assert_eq!(input.parse::<Section>().unwrap(), expected);
    }

    #[test]
    fn terminal_pages() {
        let item = ContentItem::new("s".into(), "x", Category::Movie, "X", UtcDateTime::UNIX_EPOCH);
        let full = Page {
            records: vec![CatalogRecord::Item(item)],
            rejected: 1,
            has_more: true,
        };
        assert_eq!(full.listed(), 2);
        assert!(!full.is_terminal(2));
        assert!(full.is_terminal(3), "short pages end the walk despite has_more");
        assert!(Page::empty().is_terminal(1));
        assert!(Page { has_more: false, ..full }.is_terminal(2));
    }

    #[test]
    fn completeness() {
        let mut item = ContentItem::new("s".into(), "x", Category::Movie, "X", UtcDateTime::UNIX_EPOCH);
        item.refresh_completeness();
        assert!(!item.complete);
        item.synopsis = "A film.".into();
        item.poster = Some("https://img.example.com/x.jpg".into());
        item.year = Some(2020);
        item.refresh_completeness();
        assert!(item.complete);
    }
}
