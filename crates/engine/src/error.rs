//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! These cover failures to *run* the engine at all. An engine that ran and
//! exited with a failure code is not an error; it is an
//! [`EngineOutcome`](crate::EngineOutcome).

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("difficulty engine not found (looked for {})", _0.display())]
    EngineNotFound(#[error(not(source))] PathBuf),
    /// The arrangement path has no file name to hand to the engine.
    #[display("invalid arrangement path: {}", _0.display())]
    InvalidArrangement(#[error(not(source))] PathBuf),
    /// The engine process could not be started.
    #[display("failed to start the difficulty engine")]
    Spawn,
    /// Waiting on (or killing) a running engine process failed.
    #[display("lost track of the difficulty engine process")]
    Wait,
    /// A ramp-up model could not be read or copied.
    #[display("ramp-up model error: {}", _0.display())]
    Model(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Spawn | Self::Wait)
    }
}
