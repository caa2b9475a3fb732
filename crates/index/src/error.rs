//! Index Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use crate::path::TreePath;
use derive_more::{Display, Error};

/// An index error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Path is empty, contains a NUL byte, is not UTF-8, or climbs above its
    /// first component.
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// The path is already present in the index. Usually means two creations
    /// were recorded for the same path without a deletion in between.
    #[display("path already indexed: {_0}")]
    DuplicateKey(#[error(not(source))] TreePath),
    /// The path is not present in the index.
    #[display("path not indexed: {_0}")]
    KeyNotFound(#[error(not(source))] TreePath),
    /// A path cannot be renamed into its own subtree.
    #[display("cannot rename {_0} into its own subtree {_1}")]
    InvalidRename(TreePath, TreePath),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        let path = TreePath::new("/r/a.txt").unwrap();
        assert_eq!(ErrorKind::DuplicateKey(path.clone()).to_string(), "path already indexed: /r/a.txt");
        assert_eq!(ErrorKind::KeyNotFound(path).to_string(), "path not indexed: /r/a.txt");
    }
}
