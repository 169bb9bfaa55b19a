use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::VideoCandidate;

/// Best-first ordering: quality, then confidence, then URL so that equal
/// candidates always come out in the same order.
pub fn compare(a: &VideoCandidate, b: &VideoCandidate) -> Ordering {
    b.quality
        .cmp(&a.quality)
        .then_with(|| b.source_confidence.cmp(&a.source_confidence))
        .then_with(|| a.url.as_str().cmp(b.url.as_str()))
}

/// Remove duplicate URLs (keeping the most confident sighting) and sort
/// best-first.
pub fn rank(candidates: impl IntoIterator<Item = VideoCandidate>) -> Vec<VideoCandidate> {
    let mut unique: HashMap<String, VideoCandidate> = HashMap::new();
    for candidate in candidates {
        match unique.get_mut(candidate.url.as_str()) {
            Some(existing) => {
                if candidate.source_confidence > existing.source_confidence {
                    *existing = VideoCandidate {
                        quality: existing.quality.max(candidate.quality),
                        ..candidate
                    };
                } else {
                    existing.quality = existing.quality.max(candidate.quality);
                }
            },
            None => {
                unique.insert(candidate.url.to_string(), candidate);
            },
        }
    }
    let mut ranked: Vec<_> = unique.into_values().collect();
    ranked.sort_by(compare);
    ranked
}
