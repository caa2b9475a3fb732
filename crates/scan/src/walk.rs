//! Depth-first walk of a live directory tree.

use crate::error::{ErrorKind, Result};
use driftsync_index::TreePath;
use exn::ResultExt;
use std::fs::{self, Metadata, ReadDir};
use std::path::PathBuf;

pub(crate) enum WalkEntry {
    /// A file or directory below the root. Directories are descended into
    /// right after they are returned.
    Found { path: TreePath, metadata: Metadata },
    /// A directory that was found but could not be listed.
    Unlisted(TreePath),
    /// Unreadable entry, non UTF-8 name or symlink. Already logged.
    Skip,
}

/// Pre-order walk: every directory is returned before its contents, and its
/// subtree is exhausted before the walk moves on to its next sibling.
pub(crate) struct Walker {
    stack: Vec<(TreePath, ReadDir)>,
    descend: Option<(TreePath, PathBuf)>,
}
impl Walker {
    /// Fails when the root itself can't be listed.
    pub fn new(root: &TreePath) -> Result<Self> {
        let path = root.as_path();
        let metadata = fs::metadata(path).map_err(|e| ErrorKind::from_io(e, path))?;
        if !metadata.is_dir() {
            exn::bail!(ErrorKind::NotADirectory(path.to_path_buf()));
        }
        let entries = fs::read_dir(path).map_err(|e| ErrorKind::from_io(e, path))?;
        Ok(Self { stack: vec![(root.clone(), entries)], descend: None })
    }

    fn process_entry(parent: &TreePath, entry: std::io::Result<fs::DirEntry>) -> WalkEntry {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %parent, error = %e, "skipping unreadable entry");
                return WalkEntry::Skip;
            },
        };
        let fs_path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            tracing::warn!(path = %fs_path.display(), "skipping entry with a non UTF-8 name");
            return WalkEntry::Skip;
        };
        let path = match parent.join(&name) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(path = %fs_path.display(), error = %e, "skipping entry with an invalid name");
                return WalkEntry::Skip;
            },
        };
        // DirEntry::metadata doesn't traverse symlinks.
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "skipping entry without readable metadata");
                return WalkEntry::Skip;
            },
        };
        if metadata.file_type().is_symlink() {
            tracing::debug!(path = %path, "skipping symlink");
            return WalkEntry::Skip;
        }
        if !metadata.is_dir() && !metadata.is_file() {
            tracing::debug!(path = %path, "skipping special file");
            return WalkEntry::Skip;
        }
        WalkEntry::Found { path, metadata }
    }
}
impl Iterator for Walker {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        if let Some((path, fs_path)) = self.descend.take() {
            match fs::read_dir(&fs_path) {
                Ok(entries) => self.stack.push((path, entries)),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "skipping directory that cannot be listed");
                    return Some(WalkEntry::Unlisted(path));
                },
            }
        }
        loop {
            let (parent, entries) = self.stack.last_mut()?;
            let Some(entry) = entries.next() else {
                self.stack.pop();
                continue;
            };
            let parent = parent.clone();
            let found = Self::process_entry(&parent, entry);
            if let WalkEntry::Found { path, metadata } = &found
                && metadata.is_dir()
            {
                self.descend = Some((path.clone(), path.to_path_buf()));
            }
            return Some(found);
        }
    }
}

/// Resolves the scan root, which must be an absolute path.
pub fn resolve_root(root: &std::path::Path) -> Result<TreePath> {
    if !root.is_absolute() {
        exn::bail!(ErrorKind::InvalidRoot(root.to_path_buf()));
    }
    TreePath::new(root).or_raise(|| ErrorKind::InvalidRoot(root.to_path_buf()))
}
