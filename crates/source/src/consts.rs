use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;
use std::time::Duration;

pub(crate) const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";
/// Entries on one Namakade listing page.
pub(crate) const NAMAKADE_LISTING_PAGE_SIZE: u32 = 24;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// `show-s01e02`, `show-s01-e02`, `show-se02-ep47`
regex!(SEASON_EPISODE_SLUG_REGEX, r"(?i)^(.+?)-se?(\d{1,3})-?ep?(\d{1,4})$");
// `show-ep02`, `show-episode-2`
regex!(EPISODE_ONLY_SLUG_REGEX, r"(?i)^(.+?)-(?:ep|episode-?)(\d{1,4})$");
regex!(YEAR_REGEX, r"^(\d{4})-");
// `Gilaneh (2005)`
regex!(TITLE_YEAR_REGEX, r"^(.*?)\s*\((\d{4})\)\s*$");

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

selector!(LISTING_ENTRY_SELECTOR, "article.item, div.item, li.item, div.video-item, article.post");
selector!(LISTING_FALLBACK_SELECTOR, ".poster, .movie-item, .series-item");
selector!(ENTRY_LINK_SELECTOR, "a[href]");
selector!(ENTRY_TITLE_SELECTOR, "h2, h3, .title");
selector!(ENTRY_IMAGE_SELECTOR, "img[src]");
selector!(EPISODE_GRID_SELECTOR, "ul#gridMason2 > li");
