//! Manifest Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A manifest error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for manifest operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The file could not be read or written.
    #[display("I/O error on: {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
    /// The arrangement XML could not be parsed.
    #[display("malformed arrangement: {}", _0.display())]
    MalformedArrangement(#[error(not(source))] PathBuf),
    /// The arrangement refers to a phrase that does not exist.
    #[display("phrase iteration {iteration} refers to missing phrase {phrase}")]
    MissingPhrase {
        /// Index of the offending phrase iteration.
        iteration: usize,
        /// The phrase id it refers to.
        phrase: usize,
    },
    /// The manifest JSON could not be parsed or does not have the expected shape.
    #[display("malformed manifest: {}", _0.display())]
    MalformedManifest(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // Parsing is deterministic; only the filesystem can change underneath us.
        matches!(self, Self::Io(_))
    }
}
