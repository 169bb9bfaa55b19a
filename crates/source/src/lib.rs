pub mod adapter;
mod consts;
pub mod error;
pub mod models;
mod read;
#[cfg(test)]
mod testing;
mod text;

pub use crate::adapter::SourceAdapter;
pub use crate::read::read_bounded;
pub use crate::text::{parse_episode_slug, strip_markup};
use std::sync::Arc;

pub type SourceHandle = Arc<dyn SourceAdapter + Send + Sync>;
