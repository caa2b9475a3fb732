//! Core types for tracking the state of a monitored file tree.
//!
//! - [`TreePath`]: a normalized path, compared under a [`CaseSensitivity`].
//! - [`FileMetadataHashableProperties`]: the handful of attributes that decide
//!   whether a file changed, with a comparison that understands the
//!   [`FileTime::INVALID`] sentinel.
//! - [`FileChange`], [`SyncedObject`], [`SyncPoint`]: the records the change
//!   store and baseline store persist.
//! - [`PathIndex`]: the ordered, hierarchical map the engine keeps the
//!   "current known state" of a tree in.

mod dictionary;
pub mod error;
mod metadata;
mod models;
mod path;

pub use crate::dictionary::{PathIndex, RemoveMode, Tracked};
pub use crate::metadata::{FileMetadata, FileMetadataHashableProperties, FileTime, metadata_equals};
pub use crate::models::{ChangeType, EventId, FileChange, SyncId, SyncPoint, SyncedObject};
pub use crate::path::{CaseSensitivity, TreePath};
