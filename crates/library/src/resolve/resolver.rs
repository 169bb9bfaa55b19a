use std::sync::Arc;

use exn::ResultExt;
use futures::StreamExt;
use futures::future::join_all;
use futures::stream::FuturesUnordered;
use reel_extract::models::{PlayForm, PlayerOption, SourceKind, VideoCandidate};
use reel_extract::{Extractor, mirrors_of, rank};
use reel_health::HealthTracker;
use reel_source::SourceHandle;
use reel_source::models::{ContentRef, Payload, SourceId};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::error::{ErrorKind, Result};
use super::{RequestGate, ResolveOptions, Resolution};

/// Health key for player API calls, which all go to the source itself.
const PLAYER_API_MIRROR: &str = "player-api";

fn mirror_of(reference: &ContentRef) -> &str {
    match reference {
        ContentRef::Page(url) | ContentRef::Form { page: url, .. } => url.host_str().unwrap_or_default(),
        ContentRef::Player(_) => PLAYER_API_MIRROR,
    }
}

/// Turns content pages into ranked candidates, keeping mirror health
/// up to date along the way.
pub struct Resolver {
    health: Arc<HealthTracker>,
    gate: RequestGate,
    options: ResolveOptions,
}

impl Resolver {
    pub fn new(health: Arc<HealthTracker>, options: ResolveOptions) -> Self {
        Self {
            gate: RequestGate::new(options.form_permits, options.form_spacing),
            health,
            options,
        }
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    /// Resolve a content page into ranked candidates.
    ///
    /// Never fails as a whole: every lead that produced nothing is listed in
    /// [`Resolution::failures`] and the rest still count.
    #[instrument(skip(self, source), fields(source = %source.id(), %url))]
    pub async fn resolve(&self, source: &SourceHandle, url: &Url) -> Resolution {
        let page = ContentRef::Page(url.clone());
        let mut resolution = Resolution::default();
        let payload = match self.fetch(source, &page).await {
            Ok(payload) => payload,
            Err(error) => {
                resolution.fail(&page, (*error).clone());
                return resolution;
            },
        };

        let kind = source.extraction_kind(&page);
        let extractor = Extractor::new(&payload.bytes, kind).with_budget(self.options.pattern_timeout);
        let extraction = extractor.run().await;
        resolution.partial |= extraction.is_partial() || payload.truncated;
        for failure in &extraction.failures {
            resolution.fail(&page, ErrorKind::Extract(failure.kind.clone()));
        }
        resolution.candidates.extend(extraction.candidates);

        let mut leads: Vec<ContentRef> = extraction.embeds.into_iter().map(ContentRef::Page).collect();
        if kind == SourceKind::DooPlay {
            match extractor.player_options().await {
                Ok(options) => leads.extend(options.into_iter().map(ContentRef::Player)),
                Err(error) => resolution.fail(&page, ErrorKind::Extract((*error).clone())),
            }
            match extractor.play_forms().await {
                Ok(forms) if !forms.is_empty() => resolution.absorb(self.resolve_forms(source, url, &forms).await),
                Ok(_) => {},
                Err(error) => resolution.fail(&page, ErrorKind::Extract((*error).clone())),
            }
        }
        if !leads.is_empty() {
            resolution.absorb(self.race(source, leads).await);
        }

        let ranked = rank(std::mem::take(&mut resolution.candidates));
        resolution.candidates = self.health.order_by_health(source.id().as_str(), ranked, |c| c.host.as_str());
        info!(
            candidates = resolution.candidates.len(),
            failures = resolution.failures.len(),
            partial = resolution.partial,
            "page resolved"
        );
        resolution
    }

    /// Race the player options of one page. The first option that yields a
    /// stream wins and every other request still in flight is dropped.
    pub async fn race_players(&self, source: &SourceHandle, options: &[PlayerOption]) -> Resolution {
        self.race(source, options.iter().cloned().map(ContentRef::Player).collect()).await
    }

    async fn race(&self, source: &SourceHandle, leads: Vec<ContentRef>) -> Resolution {
        let leads = self.health.order_by_health(source.id().as_str(), leads, mirror_of);
        let mut racing: FuturesUnordered<_> = leads
            .into_iter()
            .map(|lead| async move {
                let outcome = self.follow(source, &lead).await;
                (lead, outcome)
            })
            .collect();

        let mut resolution = Resolution::default();
        while let Some((lead, outcome)) = racing.next().await {
            match outcome {
                Ok(candidates) if !candidates.is_empty() => {
                    debug!(%lead, dropped = racing.len(), "race won");
                    resolution.candidates = candidates;
                    break;
                },
                Ok(_) => resolution.fail(&lead, ErrorKind::NothingFound),
                Err(error) => resolution.fail(&lead, (*error).clone()),
            }
        }
        // Dropping the losers cancels their requests.
        drop(racing);
        resolution
    }

    /// Submit every play form of a page through the request gate and keep
    /// everything they yield.
    pub async fn resolve_forms(&self, source: &SourceHandle, page: &Url, forms: &[PlayForm]) -> Resolution {
        let requests = forms.iter().map(|form| {
            let reference = ContentRef::Form {
                page: page.clone(),
                form: form.clone(),
            };
            async move {
                let outcome = self.gate.run(self.follow(source, &reference)).await.and_then(|outcome| outcome);
                (reference, outcome)
            }
        });

        let mut resolution = Resolution::default();
        for (reference, outcome) in join_all(requests).await {
            match outcome {
                Ok(candidates) if !candidates.is_empty() => resolution.candidates.extend(candidates),
                Ok(_) => resolution.fail(&reference, ErrorKind::NothingFound),
                Err(error) => resolution.fail(&reference, (*error).clone()),
            }
        }
        resolution
    }

    /// Record a failed playback of `failed` and list the mirrors worth
    /// trying next: siblings from `ranked` on other hosts, healthiest first.
    #[instrument(skip(self, failed, ranked), fields(host = %failed.host))]
    pub fn fallback(
        &self,
        source: &SourceId,
        failed: &VideoCandidate,
        reason: &str,
        ranked: &[VideoCandidate],
    ) -> Vec<VideoCandidate> {
        self.health.record_failure(source.as_str(), &failed.host, reason);
        let mirrors: Vec<VideoCandidate> = mirrors_of(failed, ranked).into_iter().cloned().collect();
        if mirrors.is_empty() {
            warn!(url = %failed.url, "no mirror left to fall back to");
        }
        self.health.order_by_health(source.as_str(), mirrors, |c| c.host.as_str())
    }

    /// Record that `candidate` played.
    pub fn confirm(&self, source: &SourceId, candidate: &VideoCandidate) {
        self.health.record_success(source.as_str(), &candidate.host);
    }

    /// Fetch one lead and extract it. When the lead itself holds no stream,
    /// follow the embedded player pages it points at, one level deep.
    async fn follow(&self, source: &SourceHandle, lead: &ContentRef) -> Result<Vec<VideoCandidate>> {
        let payload = self.fetch(source, lead).await?;
        let extraction = self.extract(source, lead, &payload).await;
        if !extraction.candidates.is_empty() {
            return Ok(extraction.candidates);
        }
        for embed in extraction.embeds.into_iter().take(self.options.max_embeds) {
            let reference = ContentRef::Page(embed);
            match self.fetch(source, &reference).await {
                Ok(payload) => {
                    let found = self.extract(source, &reference, &payload).await.candidates;
                    if !found.is_empty() {
                        return Ok(found);
                    }
                },
                Err(error) => debug!(%reference, error = %*error, "embedded player unreachable"),
            }
        }
        Ok(Vec::new())
    }

    async fn extract(&self, source: &SourceHandle, reference: &ContentRef, payload: &Payload) -> reel_extract::Extraction {
        Extractor::new(&payload.bytes, source.extraction_kind(reference))
            .with_budget(self.options.pattern_timeout)
            .run()
            .await
    }

    /// Fetch through the adapter under the request timeout, recording the
    /// outcome against the reference's mirror.
    async fn fetch(&self, source: &SourceHandle, reference: &ContentRef) -> Result<Payload> {
        let scope = source.id().as_str();
        let mirror = mirror_of(reference);
        match tokio::time::timeout(self.options.request_timeout, source.fetch(reference)).await {
            Ok(Ok(payload)) => {
                self.health.record_success(scope, mirror);
                Ok(payload)
            },
            Ok(Err(error)) => {
                self.health.record_failure(scope, mirror, &error.to_string());
                let kind = ErrorKind::Fetch((*error).clone());
                Err(error).or_raise(|| kind)
            },
            Err(_elapsed) => {
                self.health.record_failure(scope, mirror, "timed out");
                exn::bail!(ErrorKind::Timeout(self.options.request_timeout))
            },
        }
    }
}
