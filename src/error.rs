//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors from the store, scan and
//! index crates are kept as children of these.

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
    /// The change or baseline store failed. Whatever the failing call was
    /// writing was rolled back.
    #[display("storage error")]
    Storage,
    /// The live tree could not be scanned.
    #[display("scan failed")]
    Scan,
    /// Changes could not be folded into the index.
    #[display("index error")]
    Index,
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// The request contradicts what is already stored: committing a sync id
    /// twice, or the first sync without a root path.
    #[display("invariant violation: {_0}")]
    InvariantViolation(#[error(not(source))] String),
    #[display("configuration error")]
    Config,
    #[display("operation cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage | Self::Scan)
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }
}
