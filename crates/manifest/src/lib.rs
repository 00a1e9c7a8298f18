//! Manifest summaries derived from an arrangement's timing structure.
//!
//! Once the engine has rewritten an arrangement inside a container, the phrase,
//! section and difficulty summaries in the matching JSON manifest are stale.
//! [`ManifestSynchronizer`] recomputes them from the arrangement and writes
//! them back without disturbing anything else in the manifest.

pub mod arrangement;
pub mod error;
mod summary;
mod sync;

pub use crate::arrangement::Arrangement;
pub use crate::summary::{PhraseIterationSummary, PhraseSummary, STRING_MASK_LEVELS, SectionSummary, Summary};
pub use crate::sync::ManifestSynchronizer;
