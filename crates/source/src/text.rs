use scraper::Html;

use crate::consts::{EPISODE_ONLY_SLUG_REGEX, SEASON_EPISODE_SLUG_REGEX};

/// Plain text of an HTML fragment: tags dropped, entities decoded,
/// whitespace collapsed.
pub fn strip_markup(html: &str) -> String {
    if !html.contains(['<', '&']) {
        return html.split_whitespace().collect::<Vec<_>>().join(" ");
    }
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split an episode slug into `(series_slug, season, episode)`.
///
/// Slugs without a season marker are season 1.
pub fn parse_episode_slug(slug: &str) -> Option<(String, u32, u32)> {
    let slug = slug.trim().trim_matches('/');
    if let Some(captures) = SEASON_EPISODE_SLUG_REGEX.captures(slug) {
        let season = captures.get(2)?.as_str().parse().ok()?;
        let episode = captures.get(3)?.as_str().parse().ok()?;
        return Some((captures.get(1)?.as_str().to_lowercase(), season, episode));
    }
    let captures = EPISODE_ONLY_SLUG_REGEX.captures(slug)?;
    let episode = captures.get(2)?.as_str().parse().ok()?;
    Some((captures.get(1)?.as_str().to_lowercase(), 1, episode))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("eshghe-abadi-se02-ep47", Some(("eshghe-abadi", 2, 47)))]
    #[case("the-show-s01e02", Some(("the-show", 1, 2)))]
    #[case("the-show-S03-E10/", Some(("the-show", 3, 10)))]
    #[case("another-show-ep02", Some(("another-show", 1, 2)))]
    #[case("another-show-episode-12", Some(("another-show", 1, 12)))]
    #[case("a-movie-2019", None)]
    #[case("", None)]
    fn parses_episode_slugs(#[case] slug: &str, #[case] expected: Option<(&str, u32, u32)>) {
        let parsed = parse_episode_slug(slug);
        assert_eq!(parsed.as_ref().map(|(s, a, b)| (s.as_str(), *a, *b)), expected);
    }

    #[rstest]
    #[case("<p>A <b>bold</b> plan.</p>\n<p>Second&nbsp;line</p>", "A bold plan. Second line")]
    #[case("Tom &amp; Jerry", "Tom & Jerry")]
    #[case("  plain   text ", "plain text")]
    fn strips_markup(#[case] html: &str, #[case] expected: &str) {
        assert_eq!(strip_markup(html), expected);
    }
}
