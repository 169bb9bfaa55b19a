use super::Quality;

/// One numbered player option on a DooPlay page.
///
/// Each option resolves through its own player API round-trip, and the options
/// are alternatives: the first one that yields a stream wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlayerOption {
    pub post_id: u64,
    /// The page's `data-type` (`movie` or `tv`).
    pub content_type: String,
    pub nume: String,
    pub label: String,
    pub quality: Quality,
}
impl PlayerOption {
    /// Path segment the player API expects for this option's content type.
    pub fn endpoint_type(&self) -> &str {
        match self.content_type.as_str() {
            "movie" | "movies" => "movies",
            "tv" | "episode" | "episodes" => "episodes",
            other => other,
        }
    }
}

/// A `watch-N` form that must be submitted to reach the actual player page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlayForm {
    pub post_id: u64,
    /// The form's `action`, when it declares one.
    pub action: Option<String>,
    /// Every named input in document order, hidden ones included.
    pub fields: Vec<(String, String)>,
}
impl PlayForm {
    pub const NONCE_FIELD: &str = "watch_episode_nonce";
    pub const REFERER_FIELD: &str = "_wp_http_referer";

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn nonce(&self) -> Option<&str> {
        self.field(Self::NONCE_FIELD)
    }

    pub fn referer(&self) -> Option<&str> {
        self.field(Self::REFERER_FIELD).filter(|r| !r.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_fields() {
        let form = PlayForm {
            post_id: 42,
            action: None,
            fields: vec![
                ("id".into(), "42".into()),
                (PlayForm::NONCE_FIELD.into(), "abc123".into()),
                (PlayForm::REFERER_FIELD.into(), String::new()),
            ],
        };
        assert_eq!(form.nonce(), Some("abc123"));
        assert_eq!(form.field("id"), Some("42"));
        assert_eq!(form.referer(), None);
    }

    #[test]
    fn endpoint_type() {
        let mut option = PlayerOption {
            post_id: 1,
            content_type: "tv".into(),
            nume: "2".into(),
            label: "Server 2".into(),
            quality: Quality::Unknown,
        };
        assert_eq!(option.endpoint_type(), "episodes");
        option.content_type = "movie".into();
        assert_eq!(option.endpoint_type(), "movies");
    }
}
