//! Staging store: code from clients is written to a uniquely named file
//! and loaded by path, then deleted after a fixed TTL.

mod reaper;
mod store;
#[cfg(test)]
mod tests;

pub use reaper::{ArtifactReaper, ReaperHandle};
pub use store::{StagedArtifact, StagingStore};
