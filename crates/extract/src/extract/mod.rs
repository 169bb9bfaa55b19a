//! Candidate extraction from one bounded payload.

mod api;
mod markup;
mod text;

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::consts::{MAX_PAYLOAD_BYTES, PATTERN_TIMEOUT};
use crate::error::{ErrorKind, Result};
use crate::models::{PlayForm, PlayerOption, SourceKind, VideoCandidate};
use crate::pattern::run_bounded;
use crate::rank::rank;
use crate::window::bounded_window;

/// One isolated way of finding candidates in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pass {
    Markup,
    Script,
    SourceParams,
    PlayerApi,
}
impl Pass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markup => "markup",
            Self::Script => "script",
            Self::SourceParams => "source-params",
            Self::PlayerApi => "player-api",
        }
    }

    fn for_kind(kind: SourceKind) -> &'static [Pass] {
        match kind {
            SourceKind::Markup | SourceKind::DooPlay => &[Self::Markup, Self::Script, Self::SourceParams],
            SourceKind::PlayerApi => &[Self::PlayerApi, Self::Script, Self::SourceParams],
        }
    }
}
impl Display for Pass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Default)]
pub(crate) struct PassOutput {
    pub(crate) candidates: Vec<VideoCandidate>,
    pub(crate) embeds: Vec<Url>,
}
impl PassOutput {
    pub(crate) fn push(&mut self, candidate: Option<VideoCandidate>) {
        if let Some(candidate) = candidate {
            self.candidates.push(candidate);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.embeds.is_empty()
    }
}

/// A pass that failed; the other passes on the same payload still ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassFailure {
    pub pass: Pass,
    pub kind: ErrorKind,
}

/// Everything recovered from one payload.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Ranked best-first, unique by URL.
    pub candidates: Vec<VideoCandidate>,
    /// Player pages that may hold a stream once fetched themselves.
    pub embeds: Vec<Url>,
    pub failures: Vec<PassFailure>,
    /// The payload was cut to the window before parsing.
    pub truncated: bool,
}
impl Extraction {
    /// Some pass failed or the payload was cut short.
    pub fn is_partial(&self) -> bool {
        self.truncated || !self.failures.is_empty()
    }
}

/// Runs every pass appropriate for a [`SourceKind`] over one payload.
///
/// The payload is cut to the window on construction and decoded lossily, so
/// invalid UTF-8 never fails an extraction. All matching happens on the
/// blocking pool under a per-pass time budget.
#[derive(Debug, Clone)]
pub struct Extractor {
    text: Arc<str>,
    kind: SourceKind,
    truncated: bool,
    budget: Duration,
}
impl Extractor {
    pub fn new(payload: &[u8], kind: SourceKind) -> Self {
        Self::with_ceiling(payload, kind, MAX_PAYLOAD_BYTES)
    }

    /// As [`new`](Self::new) with a smaller window. Ceilings above
    /// [`MAX_PAYLOAD_BYTES`] are clamped.
    pub fn with_ceiling(payload: &[u8], kind: SourceKind, ceiling: usize) -> Self {
        let window = bounded_window(payload, ceiling.min(MAX_PAYLOAD_BYTES));
        Self {
            text: Arc::from(String::from_utf8_lossy(window)),
            kind,
            truncated: window.len() < payload.len(),
            budget: PATTERN_TIMEOUT,
        }
    }

    /// Refuse payloads that would need cutting. For shapes like JSON where a
    /// truncated document is worthless.
    pub fn exact(payload: &[u8], kind: SourceKind) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            exn::bail!(ErrorKind::CapacityExceeded(MAX_PAYLOAD_BYTES));
        }
        Ok(Self::new(payload, kind))
    }

    /// Override the per-pass time budget.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    #[instrument(skip(self), fields(kind = %self.kind, window_size = self.text.len(), truncated = self.truncated))]
    pub async fn run(&self) -> Extraction {
        let passes = Pass::for_kind(self.kind);
        let outcomes = join_all(passes.iter().map(|pass| self.run_pass(*pass))).await;
        let mut extraction = Extraction {
            truncated: self.truncated,
            ..Extraction::default()
        };
        let mut found = Vec::new();
        for (pass, outcome) in passes.iter().zip(outcomes) {
            match outcome {
                Ok(output) => {
                    debug!(%pass, candidates = output.candidates.len(), embeds = output.embeds.len(), "pass complete");
                    found.extend(output.candidates);
                    for embed in output.embeds {
                        if !extraction.embeds.contains(&embed) {
                            extraction.embeds.push(embed);
                        }
                    }
                },
                Err(error) => {
                    warn!(%pass, error = %*error, "extraction pass failed");
                    extraction.failures.push(PassFailure {
                        pass: *pass,
                        kind: (*error).clone(),
                    });
                },
            }
        }
        extraction.candidates = rank(found);
        extraction
    }

    async fn run_pass(&self, pass: Pass) -> Result<PassOutput> {
        let window = Arc::clone(&self.text);
        match pass {
            Pass::Markup => run_bounded(pass.as_str(), self.budget, move || markup::scan(&window)).await,
            Pass::Script => run_bounded(pass.as_str(), self.budget, move || text::script_urls(&window)).await,
            Pass::SourceParams => run_bounded(pass.as_str(), self.budget, move || text::source_params(&window)).await,
            Pass::PlayerApi => run_bounded(pass.as_str(), self.budget, move || api::embed_url(&window)).await?,
        }
    }

    /// DooPlay player options on the page, in page order.
    #[instrument(skip(self), fields(window_size = self.text.len()))]
    pub async fn player_options(&self) -> Result<Vec<PlayerOption>> {
        let text = Arc::clone(&self.text);
        run_bounded("player-options", self.budget, move || markup::player_options(&text)).await
    }

    /// `watch-N` forms on the page, in page order.
    #[instrument(skip(self), fields(window_size = self.text.len()))]
    pub async fn play_forms(&self) -> Result<Vec<PlayForm>> {
        let text = Arc::clone(&self.text);
        run_bounded("play-forms", self.budget, move || markup::play_forms(&text)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Origin, Quality};

    #[tokio::test]
    async fn one_failing_pass_does_not_abort_the_others() {
        // Not JSON, so the API pass fails, but the text passes still see the URL.
        let body = br#"<html>rate limited, try https://cdn.example.com/v/film.720p.mp4</html>"#;
        let extraction = Extractor::new(body, SourceKind::PlayerApi).run().await;
        assert_eq!(extraction.failures.len(), 1);
        assert_eq!(extraction.failures[0].pass, Pass::PlayerApi);
        assert!(matches!(extraction.failures[0].kind, ErrorKind::MalformedPayload(_)));
        assert_eq!(extraction.candidates.len(), 1);
        assert!(extraction.is_partial());
    }

    #[tokio::test]
    async fn duplicates_keep_the_most_confident_origin() {
        let html = br#"<video src="https://cdn.example.com/v/film.1080p.mp4"></video>
            <script>player.load("https://cdn.example.com/v/film.1080p.mp4")</script>"#;
        let extraction = Extractor::new(html, SourceKind::Markup).run().await;
        assert_eq!(extraction.candidates.len(), 1);
        assert_eq!(extraction.candidates[0].origin, Origin::MediaTag);
        assert_eq!(extraction.candidates[0].quality, Quality::P1080);
    }

    #[tokio::test]
    async fn finds_urls_deep_in_large_payloads() {
        let mut html = String::from("<html><body>");
        html.push_str(&"lorem ipsum ".repeat(300_000));
        html.push_str(r#"<script>var f = "https:\/\/cdn.example.com\/deep\/film.480p.mp4";</script></body></html>"#);
        assert!(html.len() > 3 * 1024 * 1024);
        let extraction = Extractor::new(html.as_bytes(), SourceKind::Markup).run().await;
        assert!(!extraction.truncated);
        assert_eq!(extraction.candidates.len(), 1);
        assert_eq!(extraction.candidates[0].quality, Quality::P480);
    }

    #[tokio::test]
    async fn oversized_payloads_keep_what_came_before_the_cut() {
        let mut html = String::from(r#"<video src="https://cdn.example.com/v/early.720p.mp4"></video>"#);
        html.push_str(&"x".repeat(MAX_PAYLOAD_BYTES));
        html.push_str(r#"<video src="https://cdn.example.com/v/late.1080p.mp4"></video>"#);
        let extractor = Extractor::new(html.as_bytes(), SourceKind::Markup);
        assert!(extractor.is_truncated());
        let extraction = extractor.run().await;
        let urls: Vec<_> = extraction.candidates.iter().map(|c| c.url.path()).collect();
        assert_eq!(urls, ["/v/early.720p.mp4"]);
    }

    #[test]
    fn exact_refuses_oversized_payloads() {
        let body = vec![b' '; MAX_PAYLOAD_BYTES + 1];
        let error = Extractor::exact(&body, SourceKind::PlayerApi).unwrap_err();
        assert_eq!(*error, ErrorKind::CapacityExceeded(MAX_PAYLOAD_BYTES));
        assert!(Extractor::exact(b"{}", SourceKind::PlayerApi).is_ok());
    }

    #[tokio::test]
    async fn invalid_utf8_is_decoded_lossily() {
        let mut payload = b"<a href=\"https://cdn.example.com/v/film.mp4\">\xff\xfe</a>".to_vec();
        payload.extend_from_slice(&[0xC3]);
        let extraction = Extractor::new(&payload, SourceKind::Markup).run().await;
        assert_eq!(extraction.candidates.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_budget_fails_closed() {
        let html = "<p>x</p>".repeat(200_000);
        let extraction = Extractor::new(html.as_bytes(), SourceKind::Markup).with_budget(Duration::ZERO).run().await;
        assert!(extraction.candidates.is_empty());
        assert!(extraction.failures.iter().all(|f| matches!(f.kind, ErrorKind::PatternTimeout(_))));
        assert!(!extraction.failures.is_empty());
    }

    #[tokio::test]
    async fn dooplay_helpers() {
        let html = br#"<li data-post="5" data-nume="1" data-type="movie"><span class="title">HD</span></li>
            <form id="watch-5"><input type="hidden" name="watch_episode_nonce" value="abc"></form>"#;
        let extractor = Extractor::new(html, SourceKind::DooPlay);
        let options = extractor.player_options().await.unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].quality, Quality::P720);
        let forms = extractor.play_forms().await.unwrap();
        assert_eq!(forms[0].nonce(), Some("abc"));
    }
}
