//! Scan Error Types
//!
//! Only failures on the scan root (and cancellation) are errors; anything
//! below the root that can't be read is logged and skipped.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A scan error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The root does not exist (yet).
    #[display("scan root not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("permission denied: {}", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// The root is relative or cannot be represented as a tree path.
    #[display("invalid scan root: {}", _0.display())]
    InvalidRoot(#[error(not(source))] PathBuf),
    #[display("scan root is not a directory: {}", _0.display())]
    NotADirectory(#[error(not(source))] PathBuf),
    /// Underlying I/O error while opening the root.
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// The pending changes could not be folded into the baseline.
    #[display("pending changes do not apply to the baseline")]
    Index,
    #[display("scan cancelled")]
    Cancelled,
}
impl ErrorKind {
    pub(crate) fn from_io(e: IoError, path: &std::path::Path) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(e),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::NotFound(_))
    }
}
