use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use super::sanitize;
use crate::error::{Error, ErrorKind};

/// The closed set of payload shapes the engine understands.
///
/// An adapter picks one per response; nothing downstream re-dispatches on URL
/// substrings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SourceKind {
    /// Plain HTML with media tags, iframes, anchors and inline scripts.
    #[default]
    Markup,
    /// A DooPlay themed page: markup plus player options and play forms.
    DooPlay,
    /// The JSON body returned by a DooPlay player endpoint.
    PlayerApi,
}
impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markup => "markup",
            Self::DooPlay => "dooplay",
            Self::PlayerApi => "playerapi",
        }
    }
}
impl FromStr for SourceKind {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match sanitize(s).as_str() {
            "markup" | "html" => Ok(Self::Markup),
            "dooplay" => Ok(Self::DooPlay),
            "playerapi" | "api" | "json" => Ok(Self::PlayerApi),
            _ => exn::bail!(ErrorKind::ParseError {
                field: "source_kind",
                value: s.to_string(),
            }),
        }
    }
}
impl Display for SourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
