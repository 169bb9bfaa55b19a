use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;
use std::time::Duration;

/// Hard ceiling on the bytes of a single payload the engine will ever look at.
pub const MAX_PAYLOAD_BYTES: usize = 8 * 1024 * 1024;
/// Script-embedded URLs may sit anywhere in a page, so the search window is
/// the whole bounded payload.
pub const EXTRACTION_WINDOW_BYTES: usize = MAX_PAYLOAD_BYTES;
/// Wall-clock budget for any single pattern-matching pass over untrusted text.
pub const PATTERN_TIMEOUT: Duration = Duration::from_secs(3);
/// Classification only ever looks at this many bytes of a label or URL.
pub(crate) const CLASSIFY_INPUT_LIMIT: usize = 2048;

// Characters that terminate a URL embedded in markup or script text.
const URL_BODY: &str = r#"[^\s"'<>\\`()\[\]{}]"#;
const MEDIA_EXTENSIONS: &str = "mp4|m3u8|mkv|webm|mov";

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

selector!(MEDIA_TAG_SELECTOR, "video[src], source[src]");
selector!(IFRAME_SELECTOR, "iframe[src], iframe[data-src]");
selector!(ANCHOR_SELECTOR, "a[href]");
selector!(PLAYER_OPTION_SELECTOR, "li[data-post][data-nume]");
selector!(WATCH_FORM_SELECTOR, "form[id^='watch-']");
selector!(NAMED_INPUT_SELECTOR, "input[name]");
selector!(OPTION_LABEL_SELECTOR, "span.title");

regex!(
    MEDIA_URL_REGEX,
    format!(r"(?i)https?://{URL_BODY}+\.(?:{MEDIA_EXTENSIONS})\b(?:\?{URL_BODY}*)?").as_str()
);
regex!(MEDIA_PATH_REGEX, format!(r"(?i)\.(?:{MEDIA_EXTENSIONS})(?:$|[?#])").as_str());
regex!(SOURCE_PARAM_REGEX, r#"[?&](?:amp;)?source=([^&"'\s<>]+)"#);
regex!(
    PLAYER_FILE_REGEX,
    format!(r#"(?i)["']?\b(?:file|hls)["']?\s*:\s*["'](https?:(?:\\?/){{2}}{URL_BODY}+)["']"#).as_str()
);
// Token boundaries are checked by the caller: underscores and dots separate
// tokens in file names, so `\b` is too strict and the regex crate has no
// lookaround to express it.
regex!(QUALITY_REGEX, r"(?i)(2160|1440|1080|720|540|480|360|240)([pi]?)");
regex!(QUALITY_ALIAS_REGEX, r"(?i)(fullhd|4k|uhd|qhd|fhd|hd|sd)");
