use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::consts::{CLASSIFY_INPUT_LIMIT, QUALITY_ALIAS_REGEX, QUALITY_REGEX};
use crate::error::{Error, ErrorKind};

/// Vertical resolution class of a stream.
///
/// Variants are declared worst-to-best so the derived [`Ord`] ranks
/// candidates directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Quality {
    /// Nothing in the label or URL indicated a resolution.
    #[default]
    Unknown,
    P240,
    P360,
    P480,
    P540,
    P720,
    P1080,
    P1440,
    P2160,
}
impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::P240 => "240p",
            Self::P360 => "360p",
            Self::P480 => "480p",
            Self::P540 => "540p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::P1440 => "1440p",
            Self::P2160 => "2160p",
        }
    }

    fn from_lines(lines: u32) -> Self {
        match lines {
            2160 => Self::P2160,
            1440 => Self::P1440,
            1080 => Self::P1080,
            720 => Self::P720,
            540 => Self::P540,
            480 => Self::P480,
            360 => Self::P360,
            240 => Self::P240,
            _ => Self::Unknown,
        }
    }

    fn from_alias(alias: &str) -> Self {
        match alias.to_ascii_lowercase().as_str() {
            "4k" | "uhd" => Self::P2160,
            "qhd" => Self::P1440,
            "fhd" | "fullhd" => Self::P1080,
            "hd" => Self::P720,
            "sd" => Self::P480,
            _ => Self::Unknown,
        }
    }

    /// Classify free text (a player label, a file name or a URL).
    ///
    /// Resolution tokens must stand on their own: `movie.1080p.mp4` and
    /// `movie_720.mp4` classify, while `id=21080` or `1920x1080` do not.
    /// Tokens carrying an explicit `p`/`i` suffix win over bare numbers, and
    /// numbers win over aliases like `HD`.
    pub fn classify(text: &str) -> Self {
        let text = clip(text, CLASSIFY_INPUT_LIMIT);
        let mut suffixed = Self::Unknown;
        let mut bare = Self::Unknown;
        for captures in QUALITY_REGEX.captures_iter(text) {
            let (Some(whole), Some(lines), Some(suffix)) = (captures.get(0), captures.get(1), captures.get(2)) else {
                continue;
            };
            if !is_standalone(text, whole.start(), whole.end()) {
                continue;
            }
            let quality = lines.as_str().parse().map(Self::from_lines).unwrap_or_default();
            if suffix.is_empty() {
                bare = bare.max(quality);
            } else {
                suffixed = suffixed.max(quality);
            }
        }
        if suffixed != Self::Unknown {
            return suffixed;
        }
        if bare != Self::Unknown {
            return bare;
        }
        QUALITY_ALIAS_REGEX
            .find_iter(text)
            .filter(|m| is_standalone(text, m.start(), m.end()))
            .map(|m| Self::from_alias(m.as_str()))
            .max()
            .unwrap_or_default()
    }
}

/// Whether `text[start..end]` is bordered by non-alphanumerics (or the ends).
fn is_standalone(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    let before = start.checked_sub(1).map(|i| bytes[i]);
    let after = bytes.get(end).copied();
    !before.is_some_and(|b| b.is_ascii_alphanumeric()) && !after.is_some_and(|b| b.is_ascii_alphanumeric())
}

/// Shorten to at most `limit` bytes without splitting a character.
fn clip(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

impl FromStr for Quality {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("unknown") {
            return Ok(Self::Unknown);
        }
        match Self::classify(trimmed) {
            Self::Unknown => exn::bail!(ErrorKind::ParseError {
                field: "quality",
                value: s.to_string(),
            }),
            quality => Ok(quality),
        }
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
