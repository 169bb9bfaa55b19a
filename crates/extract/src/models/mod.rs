mod candidate;
mod kind;
mod player;
mod quality;

pub use self::candidate::{Origin, VideoCandidate};
pub use self::kind::SourceKind;
pub use self::player::{PlayForm, PlayerOption};
pub use self::quality::Quality;

fn sanitize(s: impl AsRef<str>) -> String {
    s.as_ref().trim().to_lowercase().replace(['-', '_', ' '], "")
}
