//! Directory scanning and drift detection.
//!
//! Compares a live directory tree against the last committed baseline and the
//! changes recorded since, and reports what nobody recorded. See
//! [`detect_drift`].

mod drift;
pub mod error;
mod observe;
mod walk;

pub use crate::drift::{ScanReport, detect_drift};
pub use crate::observe::{ScanOptions, observe};
pub use crate::walk::resolve_root;
pub use tokio_util::sync::CancellationToken;
