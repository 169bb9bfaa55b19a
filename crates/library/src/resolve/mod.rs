//! Playback resolution: from a content page to ranked, playable candidates.
//!
//! Player options on a page are alternatives and race each other; the first
//! one to yield a stream wins and the rest are dropped mid-flight. Play
//! forms are all needed, so they go through a [`RequestGate`] instead.

pub mod error;
mod gate;
mod resolver;

use std::time::Duration;

pub use self::error::ErrorKind;
pub use self::gate::RequestGate;
pub use self::resolver::Resolver;
use reel_extract::models::VideoCandidate;
use reel_source::models::ContentRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Budget for one fetch through the source adapter.
    pub request_timeout: Duration,
    /// Budget for each extraction pass over one payload.
    pub pattern_timeout: Duration,
    /// Play form requests allowed in flight at once.
    pub form_permits: usize,
    /// Minimum gap between two play form requests starting.
    pub form_spacing: Duration,
    /// Embedded player pages followed per lead when its own payload holds
    /// no stream.
    pub max_embeds: usize,
}
impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(15),
            pattern_timeout: reel_extract::PATTERN_TIMEOUT,
            form_permits: 2,
            form_spacing: Duration::from_millis(500),
            max_embeds: 3,
        }
    }
}

/// One lead that produced nothing, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveFailure {
    /// Display form of the reference that failed.
    pub reference: String,
    pub kind: ErrorKind,
}

/// Outcome of resolving one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Best-first, healthy mirrors ahead of suspended ones.
    pub candidates: Vec<VideoCandidate>,
    pub failures: Vec<ResolveFailure>,
    /// Some lead failed or a payload was cut short, so there may be more
    /// than what `candidates` shows.
    pub partial: bool,
}
impl Resolution {
    pub fn best(&self) -> Option<&VideoCandidate> {
        self.candidates.first()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub(crate) fn fail(&mut self, reference: &ContentRef, kind: ErrorKind) {
        self.failures.push(ResolveFailure {
            reference: reference.to_string(),
            kind,
        });
        self.partial = true;
    }

    pub(crate) fn absorb(&mut self, other: Resolution) {
        self.candidates.extend(other.candidates);
        self.failures.extend(other.failures);
        self.partial |= other.partial;
    }
}
