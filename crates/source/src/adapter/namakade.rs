//! Namakade: a server-rendered catalog with no API. Listings are HTML pages
//! walked with `?page=N`, and a series page lists its episodes in a grid.

use std::time::Duration;

use async_trait::async_trait;
use exn::ResultExt;
use reel_extract::MAX_PAYLOAD_BYTES;
use reel_extract::models::SourceKind;
use reqwest::Client;
use scraper::{ElementRef, Html};
use time::UtcDateTime;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{SourceAdapter, http};
use crate::consts::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT, ENTRY_IMAGE_SELECTOR, ENTRY_LINK_SELECTOR,
    ENTRY_TITLE_SELECTOR, EPISODE_GRID_SELECTOR, LISTING_ENTRY_SELECTOR, LISTING_FALLBACK_SELECTOR,
    NAMAKADE_LISTING_PAGE_SIZE, TITLE_YEAR_REGEX,
};
use crate::error::{ErrorKind, Result};
use crate::models::{
    CatalogRecord, Category, ContentRef, ContentItem, Episode, Page, PageRequest, Payload, Section, SourceId,
};
use crate::text::strip_markup;

#[derive(Debug, Clone)]
pub struct NamakadeOptions {
    pub user_agent: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub payload_ceiling: usize,
    /// Only movies and series have listings; episodes come with their series.
    pub sections: Vec<Section>,
    pub movie_listing: String,
    pub series_listing: String,
    /// Entries the site puts on one listing page.
    pub listing_page_size: u32,
    /// Fetch every listed series' page for its episodes.
    pub expand_series: bool,
}
impl Default for NamakadeOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            payload_ceiling: MAX_PAYLOAD_BYTES,
            sections: vec![Section::Movies, Section::Series],
            movie_listing: "iran-1-movies/".to_string(),
            series_listing: "series/".to_string(),
            listing_page_size: NAMAKADE_LISTING_PAGE_SIZE,
            expand_series: true,
        }
    }
}

/// One entry of a listing page, before it becomes a catalog item.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ListingEntry {
    href: String,
    title: String,
    poster: Option<String>,
}

/// Namakade catalog adapter.
///
/// The site's listing pages have a fixed length that rarely matches the
/// requested page size, so each requested page is cut from the one or two
/// listing pages that overlap it. Listings carry no dates: items and
/// episodes are stamped with the Unix epoch, which keeps repeated syncs of an
/// unchanged listing from rewriting anything.
#[derive(Debug, Clone)]
pub struct NamakadeSource {
    id: SourceId,
    base: Url,
    client: Client,
    options: NamakadeOptions,
}
impl NamakadeSource {
    pub fn new(id: impl Into<SourceId>, base_url: &str, mut options: NamakadeOptions) -> Result<Self> {
        let base = http::base_url(base_url)?;
        let client = http::client(&options.user_agent, options.request_timeout, options.connect_timeout)?;
        let id = id.into();
        options.sections.retain(|section| {
            let listed = section.category().is_some();
            if !listed {
                debug!(source = %id, %section, "section has no listing, skipped");
            }
            listed
        });
        Ok(Self {
            id,
            base,
            client,
            options,
        })
    }

    fn listing(&self, category: Category) -> &str {
        match category {
            Category::Movie => &self.options.movie_listing,
            Category::Series => &self.options.series_listing,
        }
    }

    async fn get(&self, url: Url) -> Result<Payload> {
        let response = http::send(self.client.get(url)).await?;
        let payload = http::read(&self.id, response, self.options.payload_ceiling).await?;
        if payload.truncated {
            exn::bail!(ErrorKind::Malformed("listing exceeds payload ceiling".to_string()));
        }
        Ok(payload)
    }

    /// One page of the site's own listing. `None` marks an entry that could
    /// not be read. Past the end the site answers 404 or an empty grid.
    async fn listing_page(&self, category: Category, number: usize) -> Result<Vec<Option<ListingEntry>>> {
        let path = self.listing(category);
        let mut url = self.base.join(path).or_raise(|| ErrorKind::InvalidConfig(format!("listing: {path}")))?;
        url.query_pairs_mut().append_pair("page", &number.to_string());
        match self.get(url).await {
            Ok(payload) => Ok(parse_listing(&String::from_utf8_lossy(&payload.bytes))),
            Err(error) if matches!(&*error, ErrorKind::NotFound(_)) => Ok(Vec::new()),
            Err(error) => Err(error),
        }
    }

    /// Entries `[start, start + page_size)` of the listing, and whether the
    /// listing goes on past them.
    async fn window(&self, category: Category, request: &PageRequest) -> Result<(Vec<Option<ListingEntry>>, bool)> {
        let size = request.page_size.max(1) as usize;
        let site_size = self.options.listing_page_size.max(1) as usize;
        let start = (request.page.max(1) as usize - 1).saturating_mul(size);
        let end = start.saturating_add(size);
        let mut site_page = start / site_size;
        let mut window = Vec::with_capacity(size);
        loop {
            let first = site_page * site_size;
            if first >= end {
                return Ok((window, true));
            }
            let entries = self.listing_page(category, site_page + 1).await?;
            let count = entries.len();
            let skip = start.saturating_sub(first);
            window.extend(entries.into_iter().skip(skip).take(end - first.max(start)));
            if count < site_size {
                return Ok((window, first + count > end));
            }
            site_page += 1;
        }
    }

    fn item(&self, category: Category, entry: ListingEntry) -> Option<ContentItem> {
        let url = self.base.join(&entry.href).ok()?;
        let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
        let slug = *segments.last()?;
        let (title, year) = split_title_year(&entry.title);
        let mut item = ContentItem::new(self.id.clone(), slug, category, title, UtcDateTime::UNIX_EPOCH);
        item.year = year;
        // Movie links read `/<listing>/<genre-genre>/<slug>/`.
        if category == Category::Movie && segments.len() == 3 {
            item.genres = genres_from_path(segments[1]);
        }
        item.poster = entry.poster.and_then(|p| self.base.join(&p).ok()).map(String::from);
        item.url = Some(url.to_string());
        item.refresh_completeness();
        Some(item)
    }

    #[instrument(skip(self, series), fields(source = %self.id, series = %series.slug))]
    async fn episodes(&self, series: &ContentItem) -> Result<Vec<Episode>> {
        let Some(page) = series.url.as_deref() else {
            return Ok(Vec::new());
        };
        let page = Url::parse(page).or_raise(|| ErrorKind::Malformed(format!("series url: {page}")))?;
        let payload = self.get(page.clone()).await?;
        let grid = parse_episode_grid(&String::from_utf8_lossy(&payload.bytes));
        let episodes: Vec<Episode> = grid
            .into_iter()
            .filter_map(|(number, href, title)| {
                let url = page.join(&href).ok()?;
                Some(Episode {
                    series_id: series.id,
                    season: 1,
                    episode: number,
                    title: title.unwrap_or_else(|| format!("Episode {number}")),
                    url: Some(url.to_string()),
                    last_modified: UtcDateTime::UNIX_EPOCH,
                })
            })
            .collect();
        debug!(episodes = episodes.len(), "episode grid read");
        Ok(episodes)
    }
}

#[async_trait]
impl SourceAdapter for NamakadeSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn sections(&self) -> &[Section] {
        &self.options.sections
    }

    fn extraction_kind(&self, _reference: &ContentRef) -> SourceKind {
        SourceKind::Markup
    }

    #[instrument(skip(self), fields(source = %self.id, reference = %reference))]
    async fn fetch(&self, reference: &ContentRef) -> Result<Payload> {
        let ContentRef::Page(url) = reference else {
            exn::bail!(ErrorKind::Unsupported("play forms and player options"));
        };
        let response = http::send(self.client.get(url.clone())).await?;
        http::read(&self.id, response, self.options.payload_ceiling).await
    }

    #[instrument(skip(self), fields(source = %self.id, section = %request.section, page = request.page))]
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        let category = match request.section.category() {
            Some(category) if self.options.sections.contains(&request.section) => category,
            _ => exn::bail!(ErrorKind::Unsupported(request.section.as_str())),
        };
        let (entries, has_more) = self.window(category, request).await?;
        let mut records = Vec::with_capacity(entries.len());
        let mut rejected = 0;
        for entry in entries {
            let Some(item) = entry.and_then(|entry| self.item(category, entry)) else {
                rejected += 1;
                continue;
            };
            let episodes = if category == Category::Series && self.options.expand_series {
                match self.episodes(&item).await {
                    Ok(episodes) => episodes,
                    Err(error) => {
                        warn!(source = %self.id, series = %item.slug, error = %*error, "episode grid unreadable");
                        rejected += 1;
                        Vec::new()
                    },
                }
            } else {
                Vec::new()
            };
            records.push(CatalogRecord::Item(item));
            records.extend(episodes.into_iter().map(CatalogRecord::Episode));
        }
        debug!(records = records.len(), rejected, has_more, "listing page read");
        Ok(Page {
            records,
            rejected,
            has_more,
        })
    }
}

fn parse_listing(html: &str) -> Vec<Option<ListingEntry>> {
    let document = Html::parse_document(html);
    let mut elements: Vec<ElementRef<'_>> = document.select(&LISTING_ENTRY_SELECTOR).collect();
    if elements.is_empty() {
        elements = document.select(&LISTING_FALLBACK_SELECTOR).collect();
    }
    elements.into_iter().map(listing_entry).collect()
}

fn listing_entry(element: ElementRef<'_>) -> Option<ListingEntry> {
    let link = element.select(&ENTRY_LINK_SELECTOR).next()?;
    let href = link.value().attr("href")?.trim();
    let title = match link.value().attr("title").map(strip_markup).filter(|t| !t.is_empty()) {
        Some(title) => title,
        None => element.select(&ENTRY_TITLE_SELECTOR).next().map(|e| text_of(&e)).filter(|t| !t.is_empty())?,
    };
    let poster = element.select(&ENTRY_IMAGE_SELECTOR).next().and_then(|img| img.value().attr("src")).map(str::to_string);
    Some(ListingEntry {
        href: href.to_string(),
        title,
        poster,
    })
}

/// Episode links of a series page, numbered by their position in the grid.
fn parse_episode_grid(html: &str) -> Vec<(u32, String, Option<String>)> {
    let document = Html::parse_document(html);
    document
        .select(&EPISODE_GRID_SELECTOR)
        .zip(1..)
        .filter_map(|(cell, number)| {
            let link = cell.select(&ENTRY_LINK_SELECTOR).next()?;
            let href = link.value().attr("href")?.trim().to_string();
            let title = link
                .value()
                .attr("title")
                .or_else(|| cell.select(&ENTRY_IMAGE_SELECTOR).next().and_then(|img| img.value().attr("alt")))
                .map(strip_markup)
                .filter(|t| !t.is_empty());
            Some((number, href, title))
        })
        .collect()
}

fn text_of(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn split_title_year(title: &str) -> (String, Option<u16>) {
    match TITLE_YEAR_REGEX.captures(title) {
        Some(captures) if !captures[1].is_empty() => (captures[1].to_string(), captures[2].parse::<u16>().ok()),
        _ => (title.to_string(), None),
    }
}

/// `drama-romance` becomes `["Drama", "Romance"]`.
fn genres_from_path(segment: &str) -> Vec<String> {
    segment
        .split('-')
        .filter(|g| !g.is_empty())
        .map(|genre| {
            let mut chars = genre.chars();
            chars.next().map(|first| first.to_uppercase().chain(chars).collect()).unwrap_or_default()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentId;
    use crate::testing::{Reply, serve};
    use rstest::rstest;

    const MOVIES: &str = r#"<html><body><div class="grid">
        <article class="item">
          <a href="/iran-1-movies/drama-romance/gilaneh/" title="Gilaneh (2005)"><img src="https://img.example.com/gilaneh.jpg"></a>
        </article>
        <article class="item">
          <a href="/iran-1-movies/comedy/ekhrajiha/"><img src="/posters/ekhrajiha.jpg"></a>
          <h3> Ekhrajiha </h3>
        </article>
        <article class="item"><span>Coming soon</span></article>
    </div></body></html>"#;

    const SERIES: &str = r#"<ul class="list">
        <li class="item"><a href="/series/shahrzad/" title="Shahrzad"><img src="/posters/shahrzad.jpg"></a></li>
    </ul>"#;

    const SHAHRZAD: &str = r#"<ul id="gridMason2">
        <li><a href="/series/shahrzad/episode/1/"><img src="/t/1.jpg" alt="Shahrzad 1"></a></li>
        <li><span>Not yet aired</span></li>
        <li><a href="/series/shahrzad/episode/3/" title="Finale"></a></li>
    </ul>"#;

    fn source(base: &str, listing_page_size: u32) -> NamakadeSource {
        let options = NamakadeOptions {
            listing_page_size,
            ..NamakadeOptions::default()
        };
        NamakadeSource::new("namakade", base, options).unwrap()
    }

    fn request(section: Section, page: u32, page_size: u32) -> PageRequest {
        PageRequest {
            section,
            page,
            page_size,
        }
    }

    #[test]
    fn reads_listing_entries() {
        let entries = parse_listing(MOVIES);
        assert_eq!(entries.len(), 3);
        let first = entries[0].as_ref().unwrap();
        assert_eq!(first.href, "/iran-1-movies/drama-romance/gilaneh/");
        assert_eq!(first.title, "Gilaneh (2005)");
        assert_eq!(first.poster.as_deref(), Some("https://img.example.com/gilaneh.jpg"));
        assert_eq!(entries[1].as_ref().unwrap().title, "Ekhrajiha");
        assert_eq!(entries[2], None);
    }

    #[test]
    fn falls_back_to_poster_cards() {
        let html = r#"<div class="poster"><a href="/anime/naruto/" title="Naruto"></a></div>"#;
        let entries = parse_listing(html);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].as_ref().unwrap().title, "Naruto");
    }

    #[rstest]
    #[case("Gilaneh (2005)", "Gilaneh", Some(2005))]
    #[case("1917", "1917", None)]
    #[case("Leila", "Leila", None)]
    fn splits_years_off_titles(#[case] input: &str, #[case] title: &str, #[case] year: Option<u16>) {
        assert_eq!(split_title_year(input), (title.to_string(), year));
    }

    #[test]
    fn genres_come_from_the_link_path() {
        assert_eq!(genres_from_path("action-comedy-foreign"), ["Action", "Comedy", "Foreign"]);
        assert!(genres_from_path("").is_empty());
    }

    #[tokio::test]
    async fn pages_are_cut_from_site_listings() {
        let server = serve(vec![("/iran-1-movies/?page=1", Reply::html(MOVIES))]).await;
        let source = source(&server.base, 3);

        let first = source.fetch_page(&request(Section::Movies, 1, 2)).await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.rejected, 0);
        assert!(first.has_more);
        let CatalogRecord::Item(gilaneh) = &first.records[0] else {
            panic!("expected an item");
        };
        assert_eq!(gilaneh.id, ContentId::derive(&SourceId::from("namakade"), "gilaneh"));
        assert_eq!(gilaneh.title, "Gilaneh");
        assert_eq!(gilaneh.year, Some(2005));
        assert_eq!(gilaneh.genres, ["Drama", "Romance"]);
        assert_eq!(gilaneh.url.as_deref(), Some(format!("{}iran-1-movies/drama-romance/gilaneh/", server.base).as_str()));
        let CatalogRecord::Item(ekhrajiha) = &first.records[1] else {
            panic!("expected an item");
        };
        assert_eq!(ekhrajiha.poster.as_deref(), Some(format!("{}posters/ekhrajiha.jpg", server.base).as_str()));

        // The third entry is unreadable and page 2 of the site is a 404.
        let second = source.fetch_page(&request(Section::Movies, 2, 2)).await.unwrap();
        assert!(second.records.is_empty());
        assert_eq!(second.rejected, 1);
        assert!(!second.has_more);
        assert!(second.is_terminal(2));
    }

    #[tokio::test]
    async fn series_bring_their_episodes() {
        let server = serve(vec![
            ("/series/shahrzad/", Reply::html(SHAHRZAD)),
            ("/series/?page=1", Reply::html(SERIES)),
        ])
        .await;
        let page = source(&server.base, 24).fetch_page(&request(Section::Series, 1, 20)).await.unwrap();
        assert!(!page.has_more);
        assert_eq!(page.records.len(), 3);
        let CatalogRecord::Item(series) = &page.records[0] else {
            panic!("expected the series first");
        };
        assert_eq!(series.category, Category::Series);
        let episodes: Vec<&Episode> = page
            .records
            .iter()
            .filter_map(|r| match r {
                CatalogRecord::Episode(episode) => Some(episode),
                CatalogRecord::Item(_) => None,
            })
            .collect();
        assert!(episodes.iter().all(|e| e.series_id == series.id && e.season == 1));
        assert_eq!(episodes[0].episode, 1);
        assert_eq!(episodes[0].title, "Shahrzad 1");
        assert_eq!(episodes[1].episode, 3);
        assert_eq!(episodes[1].title, "Finale");
        assert_eq!(episodes[1].url.as_deref(), Some(format!("{}series/shahrzad/episode/3/", server.base).as_str()));
    }

    #[tokio::test]
    async fn unreadable_episode_grids_are_rejected_not_fatal() {
        let server = serve(vec![("/series/?page=1", Reply::html(SERIES)), ("/series/shahrzad/", Reply::status(500))]).await;
        let page = source(&server.base, 24).fetch_page(&request(Section::Series, 1, 20)).await.unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.rejected, 1);
    }

    #[tokio::test]
    async fn episodes_have_no_listing() {
        let source = NamakadeSource::new("namakade", "https://namakade.example.com/", NamakadeOptions {
            sections: Section::ALL.to_vec(),
            ..NamakadeOptions::default()
        })
        .unwrap();
        assert_eq!(source.sections(), [Section::Movies, Section::Series]);
        let error = source.fetch_page(&request(Section::Episodes, 1, 20)).await.unwrap_err();
        assert_eq!(*error, ErrorKind::Unsupported("episodes"));
    }
}
