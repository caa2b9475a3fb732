//! Change events, baseline entries and sync points.

use crate::metadata::FileMetadata;
use crate::path::TreePath;
use derive_more::Display;
use time::UtcDateTime;

/// What happened to a path.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChangeType {
    #[display("created")]
    Created,
    #[display("modified")]
    Modified,
    #[display("deleted")]
    Deleted,
    #[display("renamed")]
    Renamed,
}
impl ChangeType {
    pub const ALL: [Self; 4] = [Self::Created, Self::Modified, Self::Deleted, Self::Renamed];

    /// Stable name used in the `change_types` lookup table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
        }
    }
}

/// Identifier assigned by the change event store. Strictly increasing, so it
/// doubles as the order in which changes were observed.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub i64);

/// Identifier of a completed sync, chosen by the coordinator.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash)]
pub struct SyncId(String);
impl SyncId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<&str> for SyncId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}
impl From<String> for SyncId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A completed reconciliation point (a row of the `syncs` table).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPoint {
    pub id: SyncId,
    pub root_path: TreePath,
    pub completed_at: UtcDateTime,
}

/// One entry of a baseline snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedObject {
    pub local_path: TreePath,
    /// Alternate path assigned by the server, when it differs from the local one.
    pub server_linked_path: Option<TreePath>,
    pub metadata: FileMetadata,
}
impl SyncedObject {
    pub fn new(local_path: TreePath, metadata: FileMetadata) -> Self {
        Self { local_path, server_linked_path: None, metadata }
    }

    pub fn with_server_link(mut self, server_path: TreePath) -> Self {
        self.server_linked_path = Some(server_path);
        self
    }
}

/// A discrete change that has not been folded into a baseline yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub new_path: TreePath,
    /// Only set for [`ChangeType::Renamed`].
    pub old_path: Option<TreePath>,
    pub change_type: ChangeType,
    pub metadata: FileMetadata,
    pub event_id: Option<EventId>,
    /// Set on changes loaded back from storage: they already have a row and
    /// must not be inserted again.
    pub do_not_persist: bool,
}
impl FileChange {
    fn new(change_type: ChangeType, new_path: TreePath, old_path: Option<TreePath>, metadata: FileMetadata) -> Self {
        Self { new_path, old_path, change_type, metadata, event_id: None, do_not_persist: false }
    }

    pub fn created(path: TreePath, metadata: FileMetadata) -> Self {
        Self::new(ChangeType::Created, path, None, metadata)
    }

    pub fn modified(path: TreePath, metadata: FileMetadata) -> Self {
        Self::new(ChangeType::Modified, path, None, metadata)
    }

    pub fn deleted(path: TreePath, metadata: FileMetadata) -> Self {
        Self::new(ChangeType::Deleted, path, None, metadata)
    }

    pub fn renamed(old_path: TreePath, new_path: TreePath, metadata: FileMetadata) -> Self {
        Self::new(ChangeType::Renamed, new_path, Some(old_path), metadata)
    }

    /// Marks the change as already stored under `event_id`.
    pub fn stored(mut self, event_id: EventId) -> Self {
        self.event_id = Some(event_id);
        self.do_not_persist = true;
        self
    }
}
