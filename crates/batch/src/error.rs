//! Batch Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Errors raised while processing a single work item never leave the worker;
//! they are recorded against that item and the batch moves on.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A batch error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for batch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The worker thread could not be started, or died without a report.
    #[display("batch worker failed")]
    Worker,
    /// The container could not be unpacked or enumerated.
    #[display("could not unpack container: {}", _0.display())]
    Unpack(#[error(not(source))] PathBuf),
    /// The engine could not be run at all (as opposed to running and failing).
    #[display("could not run the engine on: {}", _0.display())]
    Engine(#[error(not(source))] PathBuf),
    /// The manifest of an arrangement could not be brought up to date.
    #[display("could not update the manifest of: {}", _0.display())]
    Resync(#[error(not(source))] PathBuf),
    /// The processed container could not be packed.
    #[display("could not repack container: {}", _0.display())]
    Repack(#[error(not(source))] PathBuf),
    /// A superseded file could not be removed.
    #[display("could not clean up: {}", _0.display())]
    Cleanup(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Repack(_) | Self::Cleanup(_))
    }
}
