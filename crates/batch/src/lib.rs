//! Batch processing of arrangement files and song packages.
//!
//! A [`WorkSet`] collects and classifies candidate paths; a
//! [`BatchCoordinator`] takes a snapshot of it and runs every item through the
//! engine on a worker thread, reporting [`BatchEvent`]s as it goes.

mod aggregate;
mod coordinator;
pub mod error;
mod intake;
mod options;

pub use self::aggregate::{BatchResult, BatchStatus, ResultAggregator};
pub use self::coordinator::{BatchCoordinator, BatchEvent, BatchHandle, BatchReport, progress_step};
pub use self::intake::{Admission, Rejection, WorkItem, WorkKind, WorkSet, classify};
pub use self::options::{BatchOptions, DEFAULT_PHRASE_LENGTH};
