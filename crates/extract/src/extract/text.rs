use std::borrow::Cow;

use url::Url;

use super::PassOutput;
use super::markup::decode_param;
use crate::consts;
use crate::models::{Origin, VideoCandidate};
use crate::pattern::MAX_MATCHES_PER_PASS;

/// JSON and JS string literals escape forward slashes.
fn unescape_slashes(text: &str) -> Cow<'_, str> {
    if text.contains("\\/") {
        Cow::Owned(text.replace("\\/", "/"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Script pass: absolute media URLs and `file:`/`hls:` player configuration
/// anywhere in the window, not only inside `<script>` elements.
pub(super) fn script_urls(text: &str) -> PassOutput {
    let text = unescape_slashes(text);
    let mut output = PassOutput::default();
    for found in consts::MEDIA_URL_REGEX.find_iter(&text).take(MAX_MATCHES_PER_PASS) {
        output.push(VideoCandidate::from_raw(found.as_str(), Origin::Script));
    }
    for captures in consts::PLAYER_FILE_REGEX.captures_iter(&text).take(MAX_MATCHES_PER_PASS) {
        let Some(found) = captures.get(1) else {
            continue;
        };
        let Ok(url) = Url::parse(found.as_str()) else {
            continue;
        };
        if consts::MEDIA_PATH_REGEX.is_match(url.path()) {
            output.push(VideoCandidate::from_raw(url.as_str(), Origin::Script));
        } else {
            output.embeds.push(url);
        }
    }
    output
}

/// Encoded `source=` parameters anywhere in the text, kept only when they
/// decode to a media file.
pub(super) fn source_params(text: &str) -> PassOutput {
    let text = unescape_slashes(text);
    let mut output = PassOutput::default();
    for captures in consts::SOURCE_PARAM_REGEX.captures_iter(&text).take(MAX_MATCHES_PER_PASS) {
        let Some(decoded) = captures.get(1).and_then(|raw| decode_param(raw.as_str())) else {
            continue;
        };
        let Ok(url) = Url::parse(&decoded) else {
            continue;
        };
        if consts::MEDIA_PATH_REGEX.is_match(url.path()) {
            output.push(VideoCandidate::from_raw(url.as_str(), Origin::SourceParam));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_json_escaped_urls() {
        let text = r#"<script>var cfg = {"sources":[{"file":"https:\/\/cdn.example.com\/hls\/show-s01e02\/master.m3u8","label":"HD"}]};</script>"#;
        let output = script_urls(text);
        assert_eq!(output.candidates.len(), 2);
        assert!(output.candidates.iter().all(|c| c.url.as_str() == "https://cdn.example.com/hls/show-s01e02/master.m3u8"));
        assert_eq!(output.candidates[0].mirror_group, "show-s01e02/master");
    }

    #[test]
    fn player_config_without_extension_is_an_embed() {
        let text = r#"jwplayer("p").setup({ file: "https://stream.example.com/play/abc" });"#;
        let output = script_urls(text);
        assert!(output.candidates.is_empty());
        assert_eq!(output.embeds.len(), 1);
    }

    #[test]
    fn source_params_anywhere() {
        let text = concat!(
            r#"<a href="/jwplayer/?source=https%3A%2F%2Fcdn.example.com%2Fm%2Ffilm.720p.mp4&amp;type=mp4">x</a>"#,
            r#"<a href="/x?source=https%3A%2F%2Fcdn.example.com%2Fpage.html">y</a>"#,
        );
        let output = source_params(text);
        assert_eq!(output.candidates.len(), 1);
        assert_eq!(output.candidates[0].url.as_str(), "https://cdn.example.com/m/film.720p.mp4");
        assert_eq!(output.candidates[0].origin, Origin::SourceParam);
    }

    #[test]
    fn bare_numbers_in_script_do_not_leak() {
        let text = r#"var t = 1080; var u = "https://cdn.example.com/v/21080/film.mp4";"#;
        let output = script_urls(text);
        assert_eq!(output.candidates.len(), 1);
        assert_eq!(output.candidates[0].quality, crate::models::Quality::Unknown);
    }
}
