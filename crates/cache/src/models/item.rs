use exn::ResultExt;
use reel_source::models::{Category, ContentId, ContentItem, Episode, SourceId};

use super::{from_timestamp, timestamp};
use crate::error::{Error, ErrorKind};

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub(crate) id: i64,
    pub(crate) source: String,
    pub(crate) slug: String,
    pub(crate) category: String,
    pub(crate) title: String,
    pub(crate) year: Option<i64>,
    /// JSON array of genre names.
    pub(crate) genres: String,
    pub(crate) synopsis: String,
    pub(crate) poster: Option<String>,
    pub(crate) url: Option<String>,
    pub(crate) last_modified: i64,
    pub(crate) complete: bool,
}
impl TryFrom<&ContentItem> for ItemRow {
    type Error = Error;
    fn try_from(item: &ContentItem) -> Result<Self, Self::Error> {
        Ok(Self {
            id: item.id.get(),
            source: item.source.to_string(),
            slug: item.slug.clone(),
            category: item.category.as_str().to_string(),
            title: item.title.clone(),
            year: item.year.map(i64::from),
            genres: serde_json::to_string(&item.genres).or_raise(|| ErrorKind::InvalidData("genres"))?,
            synopsis: item.synopsis.clone(),
            poster: item.poster.clone(),
            url: item.url.clone(),
            last_modified: timestamp(item.last_modified),
            complete: item.complete,
        })
    }
}
impl TryFrom<ItemRow> for ContentItem {
    type Error = Error;
    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ContentId::from_raw(row.id),
            source: SourceId::new(row.source),
            slug: row.slug,
            category: row.category.parse::<Category>().or_raise(|| ErrorKind::InvalidData("category"))?,
            title: row.title,
            year: row
                .year
                .map(|y| u16::try_from(y).or_raise(|| ErrorKind::InvalidData("year")))
                .transpose()?,
            genres: serde_json::from_str(&row.genres).or_raise(|| ErrorKind::InvalidData("genres"))?,
            synopsis: row.synopsis,
            poster: row.poster,
            url: row.url,
            last_modified: from_timestamp(row.last_modified, "last modified")?,
            complete: row.complete,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EpisodeRow {
    pub(crate) series_id: i64,
    pub(crate) season: i64,
    pub(crate) episode: i64,
    pub(crate) title: String,
    pub(crate) url: Option<String>,
    pub(crate) last_modified: i64,
}
impl From<&Episode> for EpisodeRow {
    fn from(episode: &Episode) -> Self {
        Self {
            series_id: episode.series_id.get(),
            season: i64::from(episode.season),
            episode: i64::from(episode.episode),
            title: episode.title.clone(),
            url: episode.url.clone(),
            last_modified: timestamp(episode.last_modified),
        }
    }
}
impl TryFrom<EpisodeRow> for Episode {
    type Error = Error;
    fn try_from(row: EpisodeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            series_id: ContentId::from_raw(row.series_id),
            season: u32::try_from(row.season).or_raise(|| ErrorKind::InvalidData("season"))?,
            episode: u32::try_from(row.episode).or_raise(|| ErrorKind::InvalidData("episode"))?,
            title: row.title,
            url: row.url,
            last_modified: from_timestamp(row.last_modified, "last modified")?,
        })
    }
}
