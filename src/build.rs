//! Initial index build: baseline + pending changes + drift.

use crate::Engine;
use crate::error::{ErrorKind, Result};
use driftsync_index::{FileChange, FileMetadata, PathIndex, SyncPoint, TreePath};
use driftsync_scan::error::ErrorKind as ScanErrorKind;
use driftsync_scan::{CancellationToken, ScanReport, detect_drift, resolve_root};
use driftsync_store::{baseline, changes};
use exn::ResultExt;
use std::path::Path;
use tracing::instrument;

/// What the engine hands to the synchronization coordinator.
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub root_path: TreePath,
    /// The baseline of the latest sync (empty before the first sync).
    pub index: PathIndex<FileMetadata>,
    /// Pending changes in event order, then the changes found by the scan.
    /// Every change has been persisted and carries its event id.
    pub changes: Vec<FileChange>,
}

impl Engine {
    /// Loads the latest baseline and its pending changes in one read
    /// transaction.
    async fn load_snapshot(&self) -> Result<(Option<SyncPoint>, PathIndex<FileMetadata>, Vec<FileChange>)> {
        let db = &self.inner.database;
        let mut tx = db.pool().begin().await.or_raise(|| ErrorKind::Storage)?;
        let latest = baseline::latest(&mut *tx).await.or_raise(|| ErrorKind::Storage)?;
        let mut index = PathIndex::new(self.inner.options.case_sensitivity);
        if let Some(sync) = &latest {
            for object in baseline::synced_objects(&mut *tx, &sync.id).await.or_raise(|| ErrorKind::Storage)? {
                if index.upsert(object.local_path.clone(), object.metadata).is_some() {
                    tracing::warn!(path = %object.local_path, "baseline holds the same path twice; keeping the last one");
                }
            }
        }
        let pending = changes::for_sync(&mut *tx, db.change_types(), latest.as_ref().map(|sync| &sync.id))
            .await
            .or_raise(|| ErrorKind::Storage)?;
        tx.commit().await.or_raise(|| ErrorKind::Storage)?;
        Ok((latest, index, pending))
    }

    /// Builds the index snapshot for `root_path`.
    ///
    /// The scan runs on the blocking thread pool. Changes it finds are stored
    /// before returning, and pending changes whose metadata moved on are
    /// updated in place.
    #[instrument(skip_all, fields(root = %root_path.as_ref().display()))]
    pub async fn build_index(&self, root_path: impl AsRef<Path>, cancel: CancellationToken) -> Result<IndexSnapshot> {
        let root_path = root_path.as_ref();
        let root = resolve_root(root_path).or_raise(|| ErrorKind::InvalidPath(root_path.to_path_buf()))?;
        let _guard = self.inner.lock.lock().await;

        let (latest, baseline, pending) = self.load_snapshot().await?;
        let options = self.inner.options.scan;
        let scan_root = root.clone();
        let (report, baseline, mut pending) = tokio::task::spawn_blocking(move || {
            let mut pending = pending;
            let report = detect_drift(&scan_root, &baseline, &mut pending, &options, &cancel);
            (report, baseline, pending)
        })
        .await
        .or_raise(|| ErrorKind::Scan)?;
        let ScanReport { visited, changes: found, skipped } = report.map_err(|e| {
            let kind = if matches!(&*e, ScanErrorKind::Cancelled) { ErrorKind::Cancelled } else { ErrorKind::Scan };
            e.raise(kind)
        })?;

        let db = &self.inner.database;
        let mut refreshed = 0;
        let mut tx = db.pool().begin().await.or_raise(|| ErrorKind::Storage)?;
        for change in pending.iter_mut().filter(|change| !change.do_not_persist) {
            changes::refresh(&mut *tx, change).await.or_raise(|| ErrorKind::Storage)?;
            change.do_not_persist = true;
            refreshed += 1;
        }
        let mut all = pending;
        for change in found {
            let event_id = changes::insert(&mut *tx, db.change_types(), &change).await.or_raise(|| ErrorKind::Storage)?;
            all.push(change.stored(event_id));
        }
        tx.commit().await.or_raise(|| ErrorKind::Storage)?;

        tracing::info!(
            sync_id = latest.as_ref().map(|sync| sync.id.as_str()),
            baseline = baseline.len(),
            visited = visited.len(),
            changes = all.len(),
            refreshed,
            skipped,
            "built index"
        );
        Ok(IndexSnapshot { root_path: root, index: baseline, changes: all })
    }
}
