//! Drift detection: compare a live tree with what the store expects it to be.

use crate::error::{ErrorKind, Result};
use crate::observe::{ScanOptions, observe};
use crate::walk::{WalkEntry, Walker};
use driftsync_index::{CaseSensitivity, ChangeType, FileChange, FileMetadata, PathIndex, RemoveMode, TreePath};
use exn::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Outcome of one scan.
#[derive(Debug)]
pub struct ScanReport {
    /// Every live path below the root that was looked at.
    pub visited: PathIndex<()>,
    /// Changes nobody recorded, in discovery order. Not persisted yet.
    pub changes: Vec<FileChange>,
    /// Entries that were skipped (unreadable, symlinks, unlistable directories).
    pub skipped: usize,
}

/// The baseline with every pending change folded in: what the tree should
/// look like if nothing happened that wasn't recorded.
fn expected_state(baseline: &PathIndex<FileMetadata>, pending: &[FileChange]) -> Result<PathIndex<FileMetadata>> {
    let mut expected = baseline.clone();
    for change in pending {
        expected.apply(change).or_raise(|| ErrorKind::Index)?;
    }
    Ok(expected)
}

/// For each path, the position in `pending` of the latest change that
/// describes its current state. Targets follow renames of their ancestors and
/// are dropped by deletions.
fn pending_targets(pending: &[FileChange], case: CaseSensitivity) -> PathIndex<usize> {
    let mut targets = PathIndex::new(case);
    for (position, change) in pending.iter().enumerate() {
        match change.change_type {
            ChangeType::Deleted => {
                targets.remove(&change.new_path, RemoveMode::Subtree);
            },
            ChangeType::Renamed => {
                if let Some(old_path) = &change.old_path {
                    let moved: Vec<(TreePath, usize)> = targets
                        .get_entry(old_path)
                        .into_iter()
                        .chain(targets.children_of(old_path, true))
                        .filter_map(|(path, &target)| {
                            path.rebase(old_path, &change.new_path, case).map(|path| (path, target))
                        })
                        .collect();
                    targets.remove(old_path, RemoveMode::Subtree);
                    targets.remove(&change.new_path, RemoveMode::Subtree);
                    for (path, target) in moved {
                        targets.upsert(path, target);
                    }
                }
                targets.upsert(change.new_path.clone(), position);
            },
            ChangeType::Created | ChangeType::Modified => {
                targets.upsert(change.new_path.clone(), position);
            },
        }
    }
    targets
}

/// Walks the live tree under `root` and reports the changes that explain the
/// difference between it and `baseline` plus `pending`.
///
/// - A live path targeted by a pending change whose metadata is stale gets
///   that change updated in place (`do_not_persist` cleared, metadata
///   replaced). No new change is reported for it.
/// - Other live paths are reported as Modified when they differ from the
///   expected state and as Created when the expected state lacks them.
/// - Expected paths below `root` that weren't seen are reported as Deleted,
///   ancestors first.
///
/// Renames are never inferred: a directory renamed without a recorded event
/// shows up as a deletion plus creations.
///
/// This blocks on file system I/O.
#[instrument(level = "debug", skip_all, fields(root = %root))]
pub fn detect_drift(
    root: &TreePath,
    baseline: &PathIndex<FileMetadata>,
    pending: &mut [FileChange],
    options: &ScanOptions,
    cancel: &CancellationToken,
) -> Result<ScanReport> {
    let case = baseline.case_sensitivity();
    let expected = expected_state(baseline, pending)?;
    let targets = pending_targets(pending, case);
    let mut report = ScanReport { visited: PathIndex::new(case), changes: Vec::new(), skipped: 0 };
    let mut unlisted: Vec<TreePath> = Vec::new();

    for entry in Walker::new(root)? {
        if cancel.is_cancelled() {
            exn::bail!(ErrorKind::Cancelled);
        }
        let (path, metadata) = match entry {
            WalkEntry::Found { path, metadata } => (path, metadata),
            WalkEntry::Unlisted(path) => {
                report.skipped += 1;
                unlisted.push(path);
                continue;
            },
            WalkEntry::Skip => {
                report.skipped += 1;
                continue;
            },
        };
        if report.visited.insert(path.clone(), ()).is_err() {
            // Two names that only differ in case, on a case-insensitive index.
            tracing::warn!(path = %path, "skipping entry that collides with an already scanned path");
            report.skipped += 1;
            continue;
        }
        let observed = observe(&metadata, options);

        if let Some(&position) = targets.get(&path) {
            let change = &mut pending[position];
            if !change.metadata.same_state(&observed) {
                tracing::debug!(path = %path, event_id = ?change.event_id, "pending change is stale");
                change.metadata.properties = observed.properties;
                change.do_not_persist = false;
            }
            continue;
        }
        match expected.get(&path) {
            Some(known) if known.same_state(&observed) => {},
            Some(_) => {
                tracing::debug!(path = %path, "modified since last sync");
                report.changes.push(FileChange::modified(path, observed));
            },
            None => {
                tracing::debug!(path = %path, "created since last sync");
                report.changes.push(FileChange::created(path, observed));
            },
        }
    }

    for (path, metadata) in expected.children_of(root, true) {
        if report.visited.contains(path) || unlisted.iter().any(|dir| path.starts_with(dir, case)) {
            continue;
        }
        tracing::debug!(path = %path, "deleted since last sync");
        report.changes.push(FileChange::deleted(path.clone(), metadata.clone()));
    }
    Ok(report)
}
