//! Normalized tree paths and case folding.
//!
//! Every path that enters the engine (from a watcher notification, the
//! database or a directory walk) goes through [`TreePath::new`] so that the
//! same file is always spelled the same way: `.` and repeated separators are
//! removed, `..` is resolved lexically and `/` is the only separator.
//!
//! Whether `A.txt` and `a.txt` are the same file depends on the platform, so
//! comparisons that matter take a [`CaseSensitivity`] instead of relying on
//! `PartialEq` (which is always exact).

use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// How path keys are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}
impl CaseSensitivity {
    /// Insensitive on Windows and macOS (default filesystem behaviour), sensitive elsewhere.
    pub const fn platform() -> Self {
        if cfg!(any(windows, target_os = "macos")) { Self::Insensitive } else { Self::Sensitive }
    }

    /// Fold a string into its comparison key.
    pub fn fold<'a>(&self, value: &'a str) -> Cow<'a, str> {
        match self {
            Self::Sensitive => Cow::Borrowed(value),
            Self::Insensitive => Cow::Owned(value.to_lowercase()),
        }
    }

    fn eq(&self, a: &str, b: &str) -> bool {
        self.fold(a) == self.fold(b)
    }
}
impl Default for CaseSensitivity {
    fn default() -> Self {
        Self::platform()
    }
}

/// A normalized, UTF-8, `/`-separated file-system path.
///
/// The "head" is the part that is not a name: the root `/`, or a Windows
/// prefix plus root such as `C:/`. Relative paths have an empty head.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreePath {
    raw: String,
    head: usize,
}

fn invalid(path: &Path) -> ErrorKind {
    ErrorKind::InvalidPath(path.to_string_lossy().into_owned())
}

impl TreePath {
    /// Normalizes `path`.
    ///
    /// ```
    /// use driftsync_index::TreePath;
    /// assert_eq!(TreePath::new("/r/./a//b/../c.txt/").unwrap().as_str(), "/r/a/c.txt");
    /// assert_eq!(TreePath::new("/").unwrap().as_str(), "/");
    /// assert!(TreePath::new("").is_err());
    /// assert!(TreePath::new("../outside").is_err());
    /// assert!(TreePath::new("a\0b").is_err());
    /// ```
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut head = String::new();
        let mut segments: Vec<&str> = Vec::new();
        for component in path.components() {
            match component {
                Component::Prefix(prefix) => {
                    head.push_str(prefix.as_os_str().to_str().ok_or_raise(|| invalid(path))?);
                },
                Component::RootDir => head.push('/'),
                Component::CurDir => {},
                Component::ParentDir => {
                    if segments.pop().is_none() {
                        exn::bail!(invalid(path));
                    }
                },
                Component::Normal(segment) => {
                    let segment = segment.to_str().ok_or_raise(|| invalid(path))?;
                    // Null bytes pass through Path::components() on Unix but
                    // truncate paths in C-based syscalls.
                    if segment.contains('\0') {
                        exn::bail!(invalid(path));
                    }
                    segments.push(segment);
                },
            }
        }
        if head.is_empty() && segments.is_empty() {
            exn::bail!(invalid(path));
        }
        let head_len = head.len();
        let mut raw = head;
        raw.push_str(&segments.join("/"));
        Ok(Self { raw, head: head_len })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.raw)
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.raw)
    }

    fn head(&self) -> &str {
        &self.raw[..self.head]
    }

    /// Name components, excluding the root/prefix.
    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.raw[self.head..].split('/').filter(|s| !s.is_empty())
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// `true` for `/` (or `C:/`): a path that has a head but no names.
    pub fn is_root(&self) -> bool {
        self.head > 0 && self.raw.len() == self.head
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments().last()
    }

    pub fn parent(&self) -> Option<Self> {
        let depth = self.depth();
        if depth == 0 || (depth == 1 && self.head == 0) {
            return None;
        }
        Some(self.with_segments(self.head(), self.segments().take(depth - 1)))
    }

    /// Appends a relative path. The result must stay inside `self`.
    pub fn join(&self, relative: impl AsRef<Path>) -> Result<Self> {
        let relative = relative.as_ref();
        if relative.has_root() {
            exn::bail!(invalid(relative));
        }
        let joined = Self::new(self.as_path().join(relative))?;
        if !joined.starts_with(self, CaseSensitivity::Sensitive) || joined == *self {
            exn::bail!(invalid(relative));
        }
        Ok(joined)
    }

    /// Component-based ancestor test; `true` when `self == ancestor` too.
    ///
    /// ```
    /// use driftsync_index::{CaseSensitivity, TreePath};
    /// let dir = TreePath::new("/r/Sub").unwrap();
    /// assert!(TreePath::new("/r/Sub/file").unwrap().starts_with(&dir, CaseSensitivity::Sensitive));
    /// assert!(!TreePath::new("/r/Subdir/file").unwrap().starts_with(&dir, CaseSensitivity::Sensitive));
    /// assert!(TreePath::new("/r/sub/file").unwrap().starts_with(&dir, CaseSensitivity::Insensitive));
    /// ```
    pub fn starts_with(&self, ancestor: &Self, case: CaseSensitivity) -> bool {
        if !case.eq(self.head(), ancestor.head()) {
            return false;
        }
        let mut own = self.segments();
        ancestor.segments().all(|theirs| own.next().is_some_and(|ours| case.eq(ours, theirs)))
    }

    /// `true` when `ancestor` is a proper ancestor of `self`.
    pub fn is_descendant_of(&self, ancestor: &Self, case: CaseSensitivity) -> bool {
        self.depth() > ancestor.depth() && self.starts_with(ancestor, case)
    }

    /// Swaps the `from` prefix of `self` for `to`, keeping the suffix.
    /// Returns `None` if `self` is not `from` or below it.
    ///
    /// ```
    /// use driftsync_index::{CaseSensitivity, TreePath};
    /// let moved = TreePath::new("/r/X/f.txt").unwrap().rebase(
    ///     &TreePath::new("/r/X").unwrap(),
    ///     &TreePath::new("/r/Y").unwrap(),
    ///     CaseSensitivity::Sensitive,
    /// );
    /// assert_eq!(moved.unwrap().as_str(), "/r/Y/f.txt");
    /// ```
    pub fn rebase(&self, from: &Self, to: &Self, case: CaseSensitivity) -> Option<Self> {
        if !self.starts_with(from, case) {
            return None;
        }
        let suffix = self.segments().skip(from.depth());
        Some(to.with_segments(to.head(), to.segments().chain(suffix)))
    }

    /// Comparison key under the given case sensitivity.
    pub fn key(&self, case: CaseSensitivity) -> Cow<'_, str> {
        case.fold(&self.raw)
    }

    pub fn eq_with(&self, other: &Self, case: CaseSensitivity) -> bool {
        self.key(case) == other.key(case)
    }

    fn with_segments<'a>(&self, head: &str, segments: impl Iterator<Item = &'a str>) -> Self {
        let mut raw = head.to_string();
        for (i, segment) in segments.enumerate() {
            if i > 0 {
                raw.push('/');
            }
            raw.push_str(segment);
        }
        Self { raw, head: head.len() }
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
impl AsRef<Path> for TreePath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}
impl FromStr for TreePath {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
impl TryFrom<&Path> for TreePath {
    type Error = crate::error::Error;
    fn try_from(path: &Path) -> Result<Self> {
        Self::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn p(path: &str) -> TreePath {
        TreePath::new(path).unwrap()
    }

    #[rstest]
    #[case("/r/a.txt", "/r/a.txt")]
    #[case("/r//a//b", "/r/a/b")]
    #[case("/r/./a/./b", "/r/a/b")]
    #[case("/r/a/b/..", "/r/a")]
    #[case("/r/a/", "/r/a")]
    #[case("relative/path", "relative/path")]
    #[case("/", "/")]
    fn test_normalization(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(p(input).as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("./.")]
    #[case("..")]
    #[case("a/../../b")]
    #[case("/..")]
    #[case("a\0b")]
    fn test_invalid(#[case] input: &str) {
        let err = TreePath::new(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[test]
    fn test_parent_and_file_name() {
        assert_eq!(p("/r/X/f.txt").parent(), Some(p("/r/X")));
        assert_eq!(p("/r").parent(), Some(p("/")));
        assert_eq!(p("/").parent(), None);
        assert_eq!(p("single").parent(), None);
        assert_eq!(p("/r/X/f.txt").file_name(), Some("f.txt"));
        assert_eq!(p("/").file_name(), None);
        assert!(p("/").is_root());
        assert!(!p("/r").is_root());
    }

    #[test]
    fn test_join_stays_inside() {
        assert_eq!(p("/r").join("a/b.txt").unwrap(), p("/r/a/b.txt"));
        assert_eq!(p("/").join("r").unwrap(), p("/r"));
        assert!(p("/r").join("../escape").is_err());
        assert!(p("/r").join("/abs").is_err());
        assert!(p("/r").join(".").is_err());
    }

    #[test]
    fn test_starts_with_is_component_based() {
        let sensitive = CaseSensitivity::Sensitive;
        assert!(p("/r/X/f").starts_with(&p("/r/X"), sensitive));
        assert!(p("/r/X").starts_with(&p("/r/X"), sensitive));
        assert!(p("/r/X").starts_with(&p("/"), sensitive));
        assert!(!p("/r/XY").starts_with(&p("/r/X"), sensitive));
        assert!(!p("/r/x/f").starts_with(&p("/r/X"), sensitive));
        assert!(p("/r/x/f").starts_with(&p("/R/X"), CaseSensitivity::Insensitive));
        assert!(!p("r/X").starts_with(&p("/r"), sensitive));
        assert!(p("/r/X/f").is_descendant_of(&p("/r/X"), sensitive));
        assert!(!p("/r/X").is_descendant_of(&p("/r/X"), sensitive));
    }

    #[test]
    fn test_rebase() {
        let sensitive = CaseSensitivity::Sensitive;
        assert_eq!(p("/r/X").rebase(&p("/r/X"), &p("/r/Y"), sensitive), Some(p("/r/Y")));
        assert_eq!(p("/r/X/a/b").rebase(&p("/r/X"), &p("/q"), sensitive), Some(p("/q/a/b")));
        assert_eq!(p("/r/X/a").rebase(&p("/r/X"), &p("/"), sensitive), Some(p("/a")));
        assert_eq!(p("/r/Z/a").rebase(&p("/r/X"), &p("/r/Y"), sensitive), None);
        // Insensitive matching keeps the suffix spelling as-is.
        assert_eq!(
            p("/r/x/Inner").rebase(&p("/r/X"), &p("/r/Y"), CaseSensitivity::Insensitive),
            Some(p("/r/Y/Inner"))
        );
    }

    #[test]
    fn test_keys() {
        assert_eq!(p("/R/A.txt").key(CaseSensitivity::Insensitive), "/r/a.txt");
        assert_eq!(p("/R/A.txt").key(CaseSensitivity::Sensitive), "/R/A.txt");
        assert!(p("/R/A.txt").eq_with(&p("/r/a.TXT"), CaseSensitivity::Insensitive));
        assert!(!p("/R/A.txt").eq_with(&p("/r/a.TXT"), CaseSensitivity::Sensitive));
    }
}
