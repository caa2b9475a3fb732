//! Hierarchical path index.
//!
//! A [`PathIndex`] is an ordered map from [`TreePath`] to a value, keyed by
//! the folded path string. Because `/` sorts directly before `0`, every
//! descendant of `P` lives in the contiguous key range `[P/, P0)`, so subtree
//! operations only touch the subtree (`O(log n + descendants)`), never the
//! whole map.

use crate::error::{ErrorKind, Result};
use crate::metadata::FileMetadata;
use crate::models::{ChangeType, FileChange};
use crate::path::{CaseSensitivity, TreePath};
use exn::OptionExt;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;

/// What [`PathIndex::remove`] takes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveMode {
    /// Only the entry itself; descendants stay.
    Entry,
    /// The entry and everything below it.
    Subtree,
}

/// Ordered, case-aware map of paths.
#[derive(Debug, Clone)]
pub struct PathIndex<T> {
    case: CaseSensitivity,
    entries: BTreeMap<String, (TreePath, T)>,
}

/// Key range holding the strict descendants of `key`.
fn subtree_bounds(key: &str) -> (String, String) {
    let lower = if key.ends_with('/') { key.to_string() } else { format!("{key}/") };
    let mut upper = lower.clone();
    upper.pop();
    upper.push('0');
    (lower, upper)
}

impl<T> PathIndex<T> {
    pub fn new(case: CaseSensitivity) -> Self {
        Self { case, entries: BTreeMap::new() }
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.case
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key(&self, path: &TreePath) -> String {
        path.key(self.case).into_owned()
    }

    pub fn contains(&self, path: &TreePath) -> bool {
        self.entries.contains_key(&self.key(path))
    }

    pub fn get(&self, path: &TreePath) -> Option<&T> {
        self.entries.get(&self.key(path)).map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, path: &TreePath) -> Option<&mut T> {
        let key = self.key(path);
        self.entries.get_mut(&key).map(|(_, value)| value)
    }

    /// Like [`get`](Self::get), but also returns the path as it was spelled
    /// when inserted.
    pub fn get_entry(&self, path: &TreePath) -> Option<(&TreePath, &T)> {
        self.entries.get(&self.key(path)).map(|(stored, value)| (stored, value))
    }

    /// Adds a new entry; fails with [`ErrorKind::DuplicateKey`] if the path
    /// is already present.
    pub fn insert(&mut self, path: TreePath, value: T) -> Result<()> {
        match self.entries.entry(self.key(&path)) {
            Entry::Occupied(_) => exn::bail!(ErrorKind::DuplicateKey(path)),
            Entry::Vacant(vacant) => {
                vacant.insert((path, value));
                Ok(())
            },
        }
    }

    /// Inserts or overwrites, returning the previous value.
    pub fn upsert(&mut self, path: TreePath, value: T) -> Option<T> {
        let key = self.key(&path);
        self.entries.insert(key, (path, value)).map(|(_, value)| value)
    }

    /// Removes `path` (and, with [`RemoveMode::Subtree`], its descendants).
    /// Returns the value stored at `path` itself, if there was one.
    pub fn remove(&mut self, path: &TreePath, mode: RemoveMode) -> Option<T> {
        let key = self.key(path);
        let removed = self.entries.remove(&key).map(|(_, value)| value);
        if mode == RemoveMode::Subtree {
            let (lower, upper) = subtree_bounds(&key);
            let descendants: Vec<String> = self.range(&lower, &upper).map(|(key, _)| key.clone()).collect();
            for descendant in descendants {
                self.entries.remove(&descendant);
            }
        }
        removed
    }

    fn range<'a>(&'a self, lower: &str, upper: &str) -> impl Iterator<Item = (&'a String, &'a (TreePath, T))> + use<'a, T> {
        self.entries.range::<str, _>((Bound::Included(lower), Bound::Excluded(upper)))
    }

    /// Moves `old_path` and every path below it to `new_path`, keeping the
    /// part of each path after the old prefix.
    ///
    /// Either every affected entry moves or none does: all destinations are
    /// checked for collisions before anything is touched.
    ///
    /// ```
    /// use driftsync_index::{CaseSensitivity, PathIndex, TreePath};
    /// let path = |p: &str| TreePath::new(p).unwrap();
    /// let mut index = PathIndex::new(CaseSensitivity::Sensitive);
    /// index.insert(path("/r/X"), 1).unwrap();
    /// index.insert(path("/r/X/f.txt"), 2).unwrap();
    /// index.rename(&path("/r/X"), path("/r/Y")).unwrap();
    /// assert_eq!(index.get(&path("/r/Y/f.txt")), Some(&2));
    /// assert!(!index.contains(&path("/r/X/f.txt")));
    /// ```
    pub fn rename(&mut self, old_path: &TreePath, new_path: TreePath) -> Result<()> {
        let old_key = self.key(old_path);
        let (stored_old, _) = self.entries.get(&old_key).ok_or_raise(|| ErrorKind::KeyNotFound(old_path.clone()))?;
        if new_path.is_descendant_of(old_path, self.case) {
            exn::bail!(ErrorKind::InvalidRename(old_path.clone(), new_path));
        }
        let (lower, upper) = subtree_bounds(&old_key);
        let moving: Vec<(String, TreePath)> = std::iter::once((old_key.clone(), stored_old.clone()))
            .chain(self.range(&lower, &upper).map(|(key, (path, _))| (key.clone(), path.clone())))
            .collect();
        let moving_keys: HashSet<&str> = moving.iter().map(|(key, _)| key.as_str()).collect();

        let mut destinations = Vec::with_capacity(moving.len());
        for (key, path) in &moving {
            let target = path
                .rebase(old_path, &new_path, self.case)
                .ok_or_raise(|| ErrorKind::KeyNotFound(path.clone()))?;
            let target_key = self.key(&target);
            if self.entries.contains_key(&target_key) && !moving_keys.contains(target_key.as_str()) {
                exn::bail!(ErrorKind::DuplicateKey(target));
            }
            destinations.push((key.clone(), target_key, target));
        }

        let mut staged = Vec::with_capacity(destinations.len());
        for (key, target_key, target) in destinations {
            if let Some((_, value)) = self.entries.remove(&key) {
                staged.push((target_key, target, value));
            }
        }
        for (target_key, target, value) in staged {
            self.entries.insert(target_key, (target, value));
        }
        Ok(())
    }

    /// Entries below `path`, in key order. With `recursive` set to `false`
    /// only immediate children are returned.
    ///
    /// The iterator is lazy; call again to restart it.
    pub fn children_of(&self, path: &TreePath, recursive: bool) -> impl Iterator<Item = (&TreePath, &T)> + '_ {
        let (lower, upper) = subtree_bounds(&self.key(path));
        let prefix_len = lower.len();
        self.range(&lower, &upper)
            .filter(move |(key, _)| recursive || !key[prefix_len..].contains('/'))
            .map(|(_, (path, value))| (path, value))
    }

    /// All entries in key order (ancestors before descendants).
    pub fn iter(&self) -> impl Iterator<Item = (&TreePath, &T)> + '_ {
        self.entries.values().map(|(path, value)| (path, value))
    }

    pub fn paths(&self) -> impl Iterator<Item = &TreePath> + '_ {
        self.entries.values().map(|(path, _)| path)
    }
}

impl<T> IntoIterator for PathIndex<T> {
    type Item = (TreePath, T);
    type IntoIter = std::collections::btree_map::IntoValues<String, (TreePath, T)>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

/// Values that changes can be folded into.
pub trait Tracked: From<FileMetadata> {
    fn update_metadata(&mut self, metadata: FileMetadata);
}
impl Tracked for FileMetadata {
    fn update_metadata(&mut self, metadata: FileMetadata) {
        *self = metadata;
    }
}

impl<T: Tracked> PathIndex<T> {
    /// Folds one change into the index.
    ///
    /// - **Created** inserts, replacing whatever was there.
    /// - **Deleted** removes the path and its subtree; absent paths are fine.
    /// - **Modified** updates in place, or inserts if the path is unknown
    ///   (changes may arrive out of order).
    /// - **Renamed** converges on the new path: if it already exists only its
    ///   metadata is updated and the old path dropped, otherwise the old
    ///   subtree is moved, falling back to a plain insert when neither path
    ///   is known. Leftover entries below the new path are replaced by the
    ///   moved subtree.
    pub fn apply(&mut self, change: &FileChange) -> Result<()> {
        let new_path = &change.new_path;
        let metadata = change.metadata.clone();
        match change.change_type {
            ChangeType::Created => {
                self.upsert(new_path.clone(), T::from(metadata));
            },
            ChangeType::Deleted => {
                self.remove(new_path, RemoveMode::Subtree);
            },
            ChangeType::Modified => match self.get_mut(new_path) {
                Some(value) => value.update_metadata(metadata),
                None => {
                    self.upsert(new_path.clone(), T::from(metadata));
                },
            },
            ChangeType::Renamed => {
                let old_path = change.old_path.as_ref();
                // A case-only rename shares its key with the old path.
                let case_only = old_path.is_some_and(|old| old.eq_with(new_path, self.case) && old != new_path);
                if !case_only && let Some(value) = self.get_mut(new_path) {
                    value.update_metadata(metadata);
                    if let Some(old) = old_path
                        && !new_path.starts_with(old, self.case)
                    {
                        self.remove(old, RemoveMode::Subtree);
                    }
                } else if let Some(old) = old_path
                    && self.contains(old)
                    && !new_path.is_descendant_of(old, self.case)
                {
                    if !case_only {
                        self.remove(new_path, RemoveMode::Subtree);
                    }
                    self.rename(old, new_path.clone())?;
                    if let Some(value) = self.get_mut(new_path) {
                        value.update_metadata(metadata);
                    }
                } else {
                    self.upsert(new_path.clone(), T::from(metadata));
                }
            },
        }
        Ok(())
    }
}
