//! Success and failure bookkeeping per source and mirror.
//!
//! Playback resolution uses it to try healthy mirrors first and catalog sync
//! uses the source-wide record ([`SOURCE_SCOPE`]) to back off from a source
//! that keeps failing instead of retrying it on every trigger.

pub mod error;
mod policy;
mod record;
mod tracker;

pub use crate::policy::HealthPolicy;
pub use crate::record::HealthRecord;
pub use crate::tracker::HealthTracker;

/// Mirror name of the record that tracks a source as a whole.
pub const SOURCE_SCOPE: &str = "*";
