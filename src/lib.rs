//! Change indexing and sync-state reconciliation for a monitored file tree.
//!
//! The [`Engine`] keeps track of a directory tree between synchronization
//! rounds run by an external coordinator:
//!
//! 1. On startup, [`Engine::build_index`] (or its background variant
//!    [`Engine::start_initial_indexing`]) loads the last committed baseline
//!    and the changes recorded since, scans the live tree for anything that
//!    happened while nobody was watching, and hands the result over.
//! 2. While running, a file system watcher feeds changes in through
//!    [`Engine::add_event`].
//! 3. When the coordinator finishes a round it calls
//!    [`Engine::record_completed_sync`] with the ids of the changes it
//!    synchronized; those are folded into a new baseline, everything else
//!    stays pending.
//!
//! Storage lives in [`driftsync_store`], the path index and domain types in
//! [`driftsync_index`], the scanner in [`driftsync_scan`].

mod build;
mod commit;
mod engine;
pub mod error;

pub use crate::build::IndexSnapshot;
pub use crate::engine::{Engine, EngineOptions};
pub use driftsync_config::Config;
pub use driftsync_index::{
    CaseSensitivity, ChangeType, EventId, FileChange, FileMetadata, FileMetadataHashableProperties, FileTime,
    PathIndex, SyncId, SyncPoint, SyncedObject, TreePath,
};
pub use driftsync_scan::{CancellationToken, ScanOptions};
pub use driftsync_store::Database;
