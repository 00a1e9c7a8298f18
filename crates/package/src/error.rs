//! Package Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A package error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for package operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The file extension does not belong to any known container family.
    #[display("not a recognised container: {}", _0.display())]
    UnknownPlatform(#[error(not(source))] PathBuf),
    /// The path has no usable file name to derive an output name from.
    #[display("invalid container path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// The packer program could not be located.
    #[display("container packer not found: {_0}")]
    PackerNotFound(#[error(not(source))] String),
    /// No packer command has been configured for the requested operation.
    #[display("container packer is not configured")]
    PackerNotConfigured,
    /// The packer ran but reported failure.
    #[display("container packer exited with code: {_0:?}")]
    PackerFailed(#[error(not(source))] Option<i32>),
    /// Container contents could not be decoded.
    #[display("corrupt container: {}", _0.display())]
    Corrupt(#[error(not(source))] PathBuf),
    /// Scratch directory or filesystem operation failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io)
    }
}
