use crate::models::VideoCandidate;

/// Siblings of a failed candidate taken from the ranked list it came from:
/// same mirror group and quality, served by a different host, in rank order.
///
/// Mirrors are only ever discovered, never synthesized by rewriting hosts.
pub fn mirrors_of<'a>(failed: &VideoCandidate, ranked: &'a [VideoCandidate]) -> Vec<&'a VideoCandidate> {
    if failed.mirror_group.is_empty() {
        return Vec::new();
    }
    ranked
        .iter()
        .filter(|c| c.mirror_group == failed.mirror_group && c.quality == failed.quality && c.host != failed.host)
        .collect()
}
