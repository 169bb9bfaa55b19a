use scraper::Html;
use serde_json::Value;

use super::PassOutput;
use super::markup::{absolutize, iframe};
use crate::consts;
use crate::error::{ErrorKind, Result};
use crate::models::Origin;

/// Player API pass: the JSON body of a DooPlay player endpoint.
///
/// `embed_url` is either a URL or a full `<iframe>` snippet; both go through
/// the same handling as an iframe in markup.
pub(super) fn embed_url(text: &str) -> Result<PassOutput> {
    let value: Value = match serde_json::from_str(text.trim()) {
        Ok(value) => value,
        Err(error) => exn::bail!(ErrorKind::MalformedPayload(format!("player response is not JSON: {error}"))),
    };
    let Some(embed) = value.get("embed_url").and_then(Value::as_str).map(str::trim).filter(|e| !e.is_empty()) else {
        // An empty option is a valid, if useless, answer.
        return Ok(PassOutput::default());
    };
    let mut output = PassOutput::default();
    let target = if embed.starts_with('<') {
        let fragment = Html::parse_fragment(embed);
        let src = fragment
            .select(&consts::IFRAME_SELECTOR)
            .next()
            .and_then(|el| el.value().attr("src").or_else(|| el.value().attr("data-src")))
            .map(str::to_string);
        match src {
            Some(src) => src,
            None => exn::bail!(ErrorKind::MalformedPayload("embed snippet has no iframe source".to_string())),
        }
    } else {
        embed.to_string()
    };
    iframe(&absolutize(&target), &mut output);
    for candidate in &mut output.candidates {
        candidate.origin = Origin::PlayerApi;
        candidate.source_confidence = candidate.origin.confidence();
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_media_url() {
        let output = embed_url(r#"{"embed_url":"https:\/\/cdn.example.com\/v\/film.1080p.mp4","type":"mp4"}"#).unwrap();
        assert_eq!(output.candidates.len(), 1);
        assert_eq!(output.candidates[0].origin, Origin::PlayerApi);
        assert_eq!(output.candidates[0].source_confidence, 80);
    }

    #[test]
    fn iframe_snippet_with_source() {
        let body = r#"{"embed_url":"<iframe class=\"metaframe\" src=\"https://p.example.com/jw/?source=https%3A%2F%2Fcdn.example.com%2Fa.m3u8\"></iframe>","type":"iframe"}"#;
        let output = embed_url(body).unwrap();
        assert_eq!(output.candidates[0].url.as_str(), "https://cdn.example.com/a.m3u8");
    }

    #[test]
    fn embed_page_is_returned_for_follow_up() {
        let output = embed_url(r#"{"embed_url":"https://host.example.com/e/xyz","type":"iframe"}"#).unwrap();
        assert!(output.candidates.is_empty());
        assert_eq!(output.embeds.len(), 1);
    }

    #[test]
    fn empty_and_broken_bodies() {
        assert!(embed_url(r#"{"embed_url":"","type":false}"#).unwrap().is_empty());
        let error = embed_url("<html>blocked</html>").unwrap_err();
        assert!(matches!(&*error, ErrorKind::MalformedPayload(_)));
    }
}
