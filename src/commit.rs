//! Sync completion: fold synced changes into a new baseline.

use crate::Engine;
use crate::error::{ErrorKind, Result};
use driftsync_index::{EventId, FileMetadata, PathIndex, SyncId, SyncPoint, SyncedObject, TreePath, Tracked};
use driftsync_store::{baseline, changes};
use exn::ResultExt;
use std::collections::HashSet;
use std::path::Path;
use time::UtcDateTime;
use tracing::instrument;

/// Value of the working index used while committing a sync. The server link
/// moves with its entry on renames and is dropped when the path is deleted
/// or created anew.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BaselineEntry {
    pub metadata: FileMetadata,
    pub server_linked_path: Option<TreePath>,
}
impl From<FileMetadata> for BaselineEntry {
    fn from(metadata: FileMetadata) -> Self {
        Self { metadata, server_linked_path: None }
    }
}
impl Tracked for BaselineEntry {
    fn update_metadata(&mut self, metadata: FileMetadata) {
        self.metadata = metadata;
    }
}

impl Engine {
    /// Commits `sync_id` as the new latest sync.
    ///
    /// The changes listed in `synced_event_ids` are folded into the previous
    /// baseline (in event order) and removed; every other pending change is
    /// carried over to the new sync. `new_root_path` defaults to the root of
    /// the previous sync, then to the engine's default root.
    ///
    /// Runs in a single transaction: on error nothing is written and the
    /// previous sync stays latest.
    #[instrument(skip_all, fields(sync_id = %sync_id))]
    pub async fn record_completed_sync(
        &self,
        sync_id: SyncId,
        synced_event_ids: &[EventId],
        new_root_path: Option<&Path>,
    ) -> Result<SyncPoint> {
        let _guard = self.inner.lock.lock().await;
        let db = &self.inner.database;
        // The reads below must not race the watcher's inserts.
        let mut tx = db.begin_write().await.or_raise(|| ErrorKind::Storage)?;

        let previous = baseline::latest(&mut *tx).await.or_raise(|| ErrorKind::Storage)?;
        if baseline::get(&mut *tx, &sync_id).await.or_raise(|| ErrorKind::Storage)?.is_some() {
            exn::bail!(ErrorKind::InvariantViolation(format!("sync {sync_id} already exists")));
        }
        let root_path = match new_root_path.filter(|path| !path.as_os_str().is_empty()) {
            Some(path) => TreePath::new(path).or_raise(|| ErrorKind::InvalidPath(path.to_path_buf()))?,
            None => match (&previous, self.default_root()) {
                (Some(previous), _) => previous.root_path.clone(),
                (None, Some(root)) => TreePath::new(root).or_raise(|| ErrorKind::InvalidPath(root.to_path_buf()))?,
                (None, None) => exn::bail!(ErrorKind::InvariantViolation("first sync needs a root path".to_string())),
            },
        };
        let completed_at = UtcDateTime::now();
        // Stored with second precision.
        let completed_at = completed_at.replace_nanosecond(0).unwrap_or(completed_at);

        let mut working: PathIndex<BaselineEntry> = PathIndex::new(self.inner.options.case_sensitivity);
        if let Some(previous) = &previous {
            for object in baseline::synced_objects(&mut *tx, &previous.id).await.or_raise(|| ErrorKind::Storage)? {
                let entry = BaselineEntry { metadata: object.metadata, server_linked_path: object.server_linked_path };
                working.upsert(object.local_path, entry);
            }
        }

        let synced: HashSet<EventId> = synced_event_ids.iter().copied().collect();
        let mut applied = HashSet::new();
        let mut carried = Vec::new();
        let pending = changes::for_sync(&mut *tx, db.change_types(), previous.as_ref().map(|sync| &sync.id))
            .await
            .or_raise(|| ErrorKind::Storage)?;
        for change in &pending {
            let Some(event_id) = change.event_id else {
                continue;
            };
            if synced.contains(&event_id) {
                tracing::debug!(event_id = %event_id, path = %change.new_path, kind = %change.change_type, "applying synced change");
                working.apply(change).or_raise(|| ErrorKind::Index)?;
                changes::delete(&mut *tx, event_id).await.or_raise(|| ErrorKind::Storage)?;
                applied.insert(event_id);
            } else {
                carried.push(event_id);
            }
        }
        for unknown in synced.difference(&applied) {
            tracing::warn!(event_id = %unknown, "synced event is not pending; ignoring");
        }

        let objects: Vec<SyncedObject> = working
            .iter()
            .map(|(path, entry)| SyncedObject {
                local_path: path.clone(),
                server_linked_path: entry.server_linked_path.clone(),
                metadata: entry.metadata.clone(),
            })
            .collect();
        let sync = SyncPoint { id: sync_id, root_path, completed_at };
        baseline::commit_new_sync(&mut *tx, &sync, &objects, &carried).await.or_raise(|| ErrorKind::Storage)?;
        tx.commit().await.or_raise(|| ErrorKind::Storage)?;

        tracing::info!(
            previous = previous.as_ref().map(|sync| sync.id.as_str()),
            root = %sync.root_path,
            objects = objects.len(),
            applied = applied.len(),
            carried = carried.len(),
            "recorded completed sync"
        );
        Ok(sync)
    }
}
