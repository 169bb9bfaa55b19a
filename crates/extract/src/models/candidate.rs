use std::fmt::{Display, Formatter, Result as FmtResult};

use url::Url;

use super::Quality;

/// Where in a payload a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Origin {
    /// `<video src>` or `<source src>`.
    MediaTag,
    /// An iframe whose query carries the encoded stream URL.
    Iframe,
    /// The `embed_url` of a player API response.
    PlayerApi,
    /// A URL sitting inside inline script text.
    Script,
    /// A `source=` parameter found anywhere in the text.
    SourceParam,
    /// A plain link to a media file.
    Anchor,
}
impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MediaTag => "media-tag",
            Self::Iframe => "iframe",
            Self::PlayerApi => "player-api",
            Self::Script => "script",
            Self::SourceParam => "source-param",
            Self::Anchor => "anchor",
        }
    }

    /// How much a URL found this way is trusted to actually play (0-100).
    pub fn confidence(&self) -> u8 {
        match self {
            Self::MediaTag => 90,
            Self::Iframe => 85,
            Self::PlayerApi => 80,
            Self::Script => 60,
            Self::SourceParam => 55,
            Self::Anchor => 50,
        }
    }
}
impl Display for Origin {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// A possible playable stream, not yet confirmed to play.
///
/// Candidates live for one playback request and are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VideoCandidate {
    pub url: Url,
    pub host: String,
    pub quality: Quality,
    /// Candidates sharing a group (and quality) are mirrors of one another.
    pub mirror_group: String,
    pub source_confidence: u8,
    pub origin: Origin,
}
impl VideoCandidate {
    /// Build a candidate from a raw URL string, rejecting anything that is not
    /// an absolute `http(s)` URL with a host.
    pub fn from_raw(raw: &str, origin: Origin) -> Option<Self> {
        Self::from_raw_labelled(raw, None, origin)
    }

    /// As [`from_raw`](Self::from_raw), with a player label that may carry a
    /// better quality hint than the URL itself.
    pub fn from_raw_labelled(raw: &str, label: Option<&str>, origin: Origin) -> Option<Self> {
        let url = Url::parse(raw.trim()).ok()?;
        if !matches!(url.scheme(), "http" | "https") {
            return None;
        }
        let host = url.host_str()?.to_ascii_lowercase();
        let from_url = Quality::classify(url.path());
        let quality = match label.map(Quality::classify) {
            Some(labelled) if labelled > Quality::Unknown => labelled.max(from_url),
            _ => from_url,
        };
        let mirror_group = mirror_group(&url);
        Some(Self {
            url,
            host,
            quality,
            mirror_group,
            source_confidence: origin.confidence(),
            origin,
        })
    }
}

// Generic playlist names say nothing about the content, so the directory
// holding them stands in.
const GENERIC_STEMS: [&str; 6] = ["index", "master", "playlist", "manifest", "video", "stream"];

/// Lower-cased file stem of the URL path, with the parent directory prepended
/// when the stem alone is meaningless.
fn mirror_group(url: &Url) -> String {
    let mut segments: Vec<&str> = url.path_segments().map(|s| s.filter(|s| !s.is_empty()).collect()).unwrap_or_default();
    let Some(file) = segments.pop() else {
        return String::new();
    };
    let stem = file.rsplit_once('.').map_or(file, |(stem, _)| stem).to_lowercase();
    match segments.pop() {
        Some(parent) if GENERIC_STEMS.contains(&stem.as_str()) => format!("{}/{stem}", parent.to_lowercase()),
        _ => stem,
    }
}
