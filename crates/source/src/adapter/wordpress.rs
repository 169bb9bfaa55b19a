//! WordPress REST catalog with DooPlay player endpoints.

use std::time::Duration;

use async_trait::async_trait;
use exn::ResultExt;
use reel_extract::MAX_PAYLOAD_BYTES;
use reel_extract::models::SourceKind;
use reqwest::{Client, Response, StatusCode, header};
use serde::Deserialize;
use time::macros::format_description;
use time::{PrimitiveDateTime, UtcDateTime};
use tracing::{debug, instrument, warn};
use url::Url;

use super::{SourceAdapter, http};
use crate::consts::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT, TOTAL_PAGES_HEADER, YEAR_REGEX};
use crate::error::{ErrorKind, Result};
use crate::models::{
    CatalogRecord, ContentId, ContentItem, ContentRef, Episode, Page, PageRequest, Payload, Section, SourceId,
};
use crate::text::{parse_episode_slug, strip_markup};

#[derive(Debug, Clone)]
pub struct WordPressOptions {
    pub user_agent: String,
    /// Whole-request budget, body included.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Bytes read from any one response before reading stops.
    pub payload_ceiling: usize,
    pub sections: Vec<Section>,
}
impl Default for WordPressOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            payload_ceiling: MAX_PAYLOAD_BYTES,
            sections: Section::ALL.to_vec(),
        }
    }
}

/// A WordPress site exposing its catalog through `/wp-json/wp/v2` and its
/// players through the DooPlay `/wp-json/dooplayer/v2` endpoint.
#[derive(Debug, Clone)]
pub struct WordPressSource {
    id: SourceId,
    base: Url,
    client: Client,
    options: WordPressOptions,
}
impl WordPressSource {
    pub fn new(id: impl Into<SourceId>, base_url: &str, options: WordPressOptions) -> Result<Self> {
        let base = http::base_url(base_url)?;
        let client = http::client(&options.user_agent, options.request_timeout, options.connect_timeout)?;
        Ok(Self {
            id: id.into(),
            base,
            client,
            options,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base.join(path).or_raise(|| ErrorKind::InvalidConfig(format!("endpoint: {path}")))
    }

    fn catalog_endpoint(section: Section) -> &'static str {
        match section {
            Section::Movies => "wp-json/wp/v2/movies",
            Section::Series => "wp-json/wp/v2/tvshows",
            Section::Episodes => "wp-json/wp/v2/episodes",
        }
    }

    async fn read(&self, response: Response) -> Result<Payload> {
        http::read(&self.id, response, self.options.payload_ceiling).await
    }

    fn record(&self, section: Section, post: WpPost) -> Option<CatalogRecord> {
        let last_modified = post.last_modified();
        let title = strip_markup(&post.title.rendered);
        match section.category() {
            Some(category) => {
                let mut item = ContentItem::new(self.id.clone(), post.slug.as_str(), category, title, last_modified);
                item.year = post.year();
                item.genres = post.genres();
                item.synopsis = match strip_markup(&post.content.rendered) {
                    synopsis if synopsis.is_empty() => strip_markup(&post.excerpt.rendered),
                    synopsis => synopsis,
                };
                item.poster = post.poster();
                item.url = post.link.clone();
                item.refresh_completeness();
                Some(CatalogRecord::Item(item))
            },
            None => {
                let from_link = post.link.as_deref().and_then(|l| l.trim_end_matches('/').rsplit('/').next());
                let Some((series_slug, season, episode)) =
                    parse_episode_slug(&post.slug).or_else(|| from_link.and_then(parse_episode_slug))
                else {
                    warn!(source = %self.id, slug = %post.slug, "episode slug has no season/episode marker");
                    return None;
                };
                Some(CatalogRecord::Episode(Episode {
                    series_id: ContentId::derive(&self.id, &series_slug),
                    season,
                    episode,
                    title,
                    url: post.link,
                    last_modified,
                }))
            },
        }
    }
}

#[async_trait]
impl SourceAdapter for WordPressSource {
    fn id(&self) -> &SourceId {
        &self.id
    }

    fn sections(&self) -> &[Section] {
        &self.options.sections
    }

    fn extraction_kind(&self, reference: &ContentRef) -> SourceKind {
        match reference {
            ContentRef::Page(url) if url.host() == self.base.host() => SourceKind::DooPlay,
            ContentRef::Page(_) | ContentRef::Form { .. } => SourceKind::Markup,
            ContentRef::Player(_) => SourceKind::PlayerApi,
        }
    }

    #[instrument(skip(self), fields(source = %self.id, reference = %reference))]
    async fn fetch(&self, reference: &ContentRef) -> Result<Payload> {
        let request = match reference {
            ContentRef::Page(url) => self.client.get(url.clone()),
            ContentRef::Form { page, form } => {
                let action = match form.action.as_deref() {
                    Some(action) => page.join(action).or_raise(|| ErrorKind::Malformed(format!("form action: {action}")))?,
                    None => self.endpoint("play/")?,
                };
                self.client.post(action).header(header::REFERER, page.as_str()).form(&form.fields)
            },
            ContentRef::Player(option) => {
                let path = format!("wp-json/dooplayer/v2/{}/{}/{}", option.post_id, option.endpoint_type(), option.nume);
                self.client.get(self.endpoint(&path)?).header(header::ACCEPT, "application/json")
            },
        };
        let response = http::send(request).await?;
        self.read(response).await
    }

    #[instrument(skip(self), fields(source = %self.id, section = %request.section, page = request.page))]
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page> {
        if !self.options.sections.contains(&request.section) {
            exn::bail!(ErrorKind::Unsupported(request.section.as_str()));
        }
        let url = self.endpoint(Self::catalog_endpoint(request.section))?;
        let query = [
            ("page", request.page.to_string()),
            ("per_page", request.page_size.to_string()),
            ("orderby", "modified".to_string()),
            ("order", "desc".to_string()),
            ("_embed", "true".to_string()),
        ];
        let response = http::send(self.client.get(url).query(&query)).await?;
        // WordPress answers 400 `rest_post_invalid_page_number` past the end.
        if response.status() == StatusCode::BAD_REQUEST {
            return Ok(Page::empty());
        }
        let total_pages = response
            .headers()
            .get(TOTAL_PAGES_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok());
        let payload = self.read(response).await?;
        if payload.truncated {
            exn::bail!(ErrorKind::Malformed("catalog page exceeds payload ceiling".to_string()));
        }
        let posts: Vec<WpPost> = serde_json::from_slice(&payload.bytes)
            .or_raise(|| ErrorKind::Malformed(format!("{} page {}", request.section, request.page)))?;
        let returned = posts.len();
        let records: Vec<_> = posts.into_iter().filter_map(|post| self.record(request.section, post)).collect();
        let has_more = match total_pages {
            Some(total) => request.page < total && returned > 0,
            None => returned >= request.page_size as usize,
        };
        let rejected = returned - records.len();
        debug!(returned, rejected, has_more, "catalog page fetched");
        Ok(Page {
            records,
            rejected,
            has_more,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(default)]
    source_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Term {
    #[serde(default)]
    taxonomy: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct Embedded {
    #[serde(default, rename = "wp:featuredmedia")]
    featured_media: Vec<Media>,
    #[serde(default, rename = "wp:term")]
    terms: Vec<Vec<Term>>,
}

#[derive(Debug, Deserialize)]
struct WpPost {
    slug: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    date_gmt: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    modified_gmt: Option<String>,
    #[serde(default)]
    modified: Option<String>,
    #[serde(default)]
    title: Rendered,
    #[serde(default)]
    content: Rendered,
    #[serde(default)]
    excerpt: Rendered,
    #[serde(default, rename = "_embedded")]
    embedded: Embedded,
}
impl WpPost {
    fn last_modified(&self) -> UtcDateTime {
        [&self.modified_gmt, &self.modified, &self.date_gmt, &self.date]
            .into_iter()
            .filter_map(|value| value.as_deref().and_then(parse_wp_date))
            .next()
            .unwrap_or(UtcDateTime::UNIX_EPOCH)
    }

    fn year(&self) -> Option<u16> {
        let date = self.date.as_deref().or(self.date_gmt.as_deref())?;
        YEAR_REGEX.captures(date)?.get(1)?.as_str().parse().ok()
    }

    fn genres(&self) -> Vec<String> {
        let mut genres: Vec<String> = self
            .embedded
            .terms
            .iter()
            .flatten()
            .filter(|term| term.taxonomy == "genres" && !term.name.is_empty())
            .map(|term| strip_markup(&term.name))
            .collect();
        genres.dedup();
        genres
    }

    fn poster(&self) -> Option<String> {
        self.embedded.featured_media.iter().find_map(|m| m.source_url.clone()).filter(|u| !u.is_empty())
    }
}

/// WordPress dates: `2025-11-25T18:45:49`, with the `_gmt` variants in UTC.
fn parse_wp_date(value: &str) -> Option<UtcDateTime> {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    let value = value.trim().trim_end_matches('Z');
    let value = value.get(..19).unwrap_or(value);
    let parsed = PrimitiveDateTime::parse(value, format).ok()?;
    Some(UtcDateTime::new(parsed.date(), parsed.time()))
}
