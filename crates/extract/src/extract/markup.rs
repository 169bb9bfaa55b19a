use std::borrow::Cow;
use std::collections::HashSet;

use scraper::{ElementRef, Html};
use tracing::{trace, warn};
use url::{Url, form_urlencoded};

use super::PassOutput;
use crate::consts;
use crate::models::{Origin, PlayForm, PlayerOption, Quality, VideoCandidate};
use crate::pattern::MAX_MATCHES_PER_PASS;

/// DOM pass: media tags, iframes carrying a `source=` stream and anchors to
/// media files.
pub(super) fn scan(text: &str) -> PassOutput {
    let document = Html::parse_document(text);
    let mut output = PassOutput::default();
    for element in document.select(&consts::MEDIA_TAG_SELECTOR).take(MAX_MATCHES_PER_PASS) {
        let Some(src) = element.value().attr("src") else {
            continue;
        };
        let label = ["label", "res", "size", "title"].iter().find_map(|a| element.value().attr(a));
        output.push(VideoCandidate::from_raw_labelled(&absolutize(src), label, Origin::MediaTag));
    }
    for element in document.select(&consts::IFRAME_SELECTOR).take(MAX_MATCHES_PER_PASS) {
        let Some(src) = element.value().attr("src").or_else(|| element.value().attr("data-src")) else {
            continue;
        };
        iframe(&absolutize(src), &mut output);
    }
    for element in document.select(&consts::ANCHOR_SELECTOR).take(MAX_MATCHES_PER_PASS * 4) {
        if output.candidates.len() >= MAX_MATCHES_PER_PASS {
            break;
        }
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        if !consts::MEDIA_PATH_REGEX.is_match(href) {
            continue;
        }
        let label = text_of(&element);
        output.push(VideoCandidate::from_raw_labelled(&absolutize(href), Some(&label), Origin::Anchor));
    }
    trace!(candidates = output.candidates.len(), embeds = output.embeds.len(), "markup pass finished");
    output
}

/// An iframe either wraps a stream in its `source=` parameter, points at a
/// media file directly, or is an embedded player page worth fetching.
pub(super) fn iframe(src: &str, output: &mut PassOutput) {
    let Ok(url) = Url::parse(src) else {
        return;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return;
    }
    if let Some(source) = source_param(&url) {
        output.push(VideoCandidate::from_raw(&source, Origin::Iframe));
    } else if consts::MEDIA_PATH_REGEX.is_match(url.path()) {
        output.push(VideoCandidate::from_raw(url.as_str(), Origin::Iframe));
    } else {
        output.embeds.push(url);
    }
}

/// The decoded `source` query parameter, if it holds an absolute URL.
pub(crate) fn source_param(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "source")
        .map(|(_, value)| value.into_owned())
        .filter(|value| value.starts_with("http://") || value.starts_with("https://"))
}

/// Decode a raw (still percent-encoded) `source=` value.
pub(crate) fn decode_param(raw: &str) -> Option<String> {
    let encoded = format!("source={raw}");
    form_urlencoded::parse(encoded.as_bytes()).next().map(|(_, value)| value.into_owned())
}

pub(crate) fn absolutize(raw: &str) -> Cow<'_, str> {
    let raw = raw.trim();
    match raw.strip_prefix("//") {
        Some(rest) => Cow::Owned(format!("https://{rest}")),
        None => Cow::Borrowed(raw),
    }
}

fn text_of(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// DooPlay player options, in page order, without trailers or duplicates.
pub(super) fn player_options(text: &str) -> Vec<PlayerOption> {
    let document = Html::parse_document(text);
    let mut seen = HashSet::new();
    let mut options = Vec::new();
    for element in document.select(&consts::PLAYER_OPTION_SELECTOR).take(MAX_MATCHES_PER_PASS) {
        let value = element.value();
        let (Some(post), Some(nume)) = (value.attr("data-post"), value.attr("data-nume")) else {
            continue;
        };
        let nume = nume.trim();
        if nume.is_empty() || nume.eq_ignore_ascii_case("trailer") {
            continue;
        }
        let Ok(post_id) = post.trim().parse::<u64>() else {
            warn!(post, "player option has a non-numeric post id");
            continue;
        };
        if !seen.insert((post_id, nume.to_string())) {
            continue;
        }
        let label = element
            .select(&consts::OPTION_LABEL_SELECTOR)
            .next()
            .map(|title| text_of(&title))
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| text_of(&element));
        options.push(PlayerOption {
            post_id,
            content_type: value.attr("data-type").unwrap_or("movie").trim().to_lowercase(),
            nume: nume.to_string(),
            quality: Quality::classify(&label),
            label,
        });
    }
    options
}

/// `watch-N` forms with every named input, hidden ones included.
pub(super) fn play_forms(text: &str) -> Vec<PlayForm> {
    let document = Html::parse_document(text);
    let mut forms = Vec::new();
    for form in document.select(&consts::WATCH_FORM_SELECTOR).take(MAX_MATCHES_PER_PASS) {
        let Some(post_id) = form.value().id().and_then(|id| id.strip_prefix("watch-")).and_then(|n| n.parse::<u64>().ok())
        else {
            continue;
        };
        let mut fields: Vec<(String, String)> = form
            .select(&consts::NAMED_INPUT_SELECTOR)
            .filter_map(|input| {
                let name = input.value().attr("name")?;
                Some((name.to_string(), input.value().attr("value").unwrap_or_default().to_string()))
            })
            .collect();
        if !fields.iter().any(|(name, _)| name == "id") {
            fields.insert(0, ("id".to_string(), post_id.to_string()));
        }
        forms.push(PlayForm {
            post_id,
            action: form.value().attr("action").map(str::to_string).filter(|a| !a.is_empty()),
            fields,
        });
    }
    forms
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAY_PAGE: &str = r#"
        <html><body>
          <video src="https://cdn1.example.com/media/Film.2020.720p.mp4"></video>
          <iframe src="https://player.example.com/jwplayer/?source=https%3A%2F%2Fcdn2.example.com%2Fv%2Ffilm.1080p.mp4&id=9"></iframe>
          <iframe data-src="//embed.example.org/e/abc123"></iframe>
          <a href="https://cdn3.example.com/dl/film.480p.mkv">Download 480p</a>
          <a href="/about">About</a>
        </body></html>
    "#;

    #[test]
    fn finds_every_markup_shape() {
        let output = scan(PLAY_PAGE);
        let urls: Vec<_> = output.candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://cdn1.example.com/media/Film.2020.720p.mp4",
                "https://cdn2.example.com/v/film.1080p.mp4",
                "https://cdn3.example.com/dl/film.480p.mkv",
            ]
        );
        assert_eq!(output.candidates[1].origin, Origin::Iframe);
        assert_eq!(output.candidates[1].quality, Quality::P1080);
        assert_eq!(output.embeds.len(), 1);
        assert_eq!(output.embeds[0].as_str(), "https://embed.example.org/e/abc123");
    }

    #[test]
    fn reads_player_options() {
        let html = r#"
            <ul id="playeroptionsul">
              <li class="dooplay_player_option" data-type="tv" data-post="8812" data-nume="trailer"><span class="title">Trailer</span></li>
              <li class="dooplay_player_option" data-type="tv" data-post="8812" data-nume="1"><span class="title">Server 1 - 720p</span></li>
              <li class="dooplay_player_option" data-type="tv" data-post="8812" data-nume="2"><span class="title">Server 2 - 1080p</span></li>
              <li class="dooplay_player_option" data-type="tv" data-post="8812" data-nume="2"><span class="title">Duplicate</span></li>
              <li class="dooplay_player_option" data-type="tv" data-post="abc" data-nume="3">Broken</li>
            </ul>
        "#;
        let options = player_options(html);
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].nume, "1");
        assert_eq!(options[0].quality, Quality::P720);
        assert_eq!(options[1].label, "Server 2 - 1080p");
        assert_eq!(options[1].endpoint_type(), "episodes");
    }

    #[test]
    fn reads_play_forms() {
        let html = r#"
            <form id="watch-4410" method="post" action="https://site.example.com/play/">
              <input type="hidden" name="id" value="4410">
              <input type="hidden" name="watch_episode_nonce" value="n0nce">
              <input type="hidden" name="_wp_http_referer" value="/episode/show-s01e02/">
            </form>
            <form id="watch-"><input name="x" value="y"></form>
            <form id="watch-77"><input type="hidden" name="watch_episode_nonce" value="second"></form>
        "#;
        let forms = play_forms(html);
        assert_eq!(forms.len(), 2);
        assert_eq!(forms[0].post_id, 4410);
        assert_eq!(forms[0].action.as_deref(), Some("https://site.example.com/play/"));
        assert_eq!(forms[0].nonce(), Some("n0nce"));
        assert_eq!(forms[0].referer(), Some("/episode/show-s01e02/"));
        assert_eq!(forms[1].field("id"), Some("77"));
    }

    #[test]
    fn decodes_source_params() {
        assert_eq!(
            decode_param("https%3A%2F%2Fcdn.example.com%2Fa.mp4").as_deref(),
            Some("https://cdn.example.com/a.mp4")
        );
    }
}
