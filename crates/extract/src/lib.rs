mod consts;
pub mod error;
mod extract;
mod mirror;
pub mod models;
mod pattern;
mod rank;
mod window;

use tracing::instrument;

pub use crate::consts::{EXTRACTION_WINDOW_BYTES, MAX_PAYLOAD_BYTES, PATTERN_TIMEOUT};
pub use crate::extract::{Extraction, Extractor, Pass, PassFailure};
pub use crate::mirror::mirrors_of;
use crate::models::{SourceKind, VideoCandidate};
pub use crate::rank::{compare, rank};
pub use crate::window::bounded_window;

/// Easy, top-level entrypoint: ranked candidates from raw payload bytes.
///
/// - Payloads larger than [`MAX_PAYLOAD_BYTES`] are cut to a window first,
/// - every pass runs under [`PATTERN_TIMEOUT`], and
/// - a failing pass only loses its own candidates.
///
/// Use [`Extractor`] directly to see which passes failed, to collect embedded
/// player pages, or to list DooPlay player options and play forms.
#[instrument(skip(payload), fields(payload_size = payload.as_ref().len()))]
pub async fn extract(payload: impl AsRef<[u8]>, kind: SourceKind) -> Vec<VideoCandidate> {
    Extractor::new(payload.as_ref(), kind).run().await.candidates
}
