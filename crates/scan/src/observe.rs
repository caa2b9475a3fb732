use driftsync_index::{FileMetadata, FileMetadataHashableProperties, FileTime};
use std::fs::Metadata;

/// How live entries are turned into metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// Report `max(last access, last write)` as the last modified time.
    ///
    /// Off by default except on Windows: with `relatime`, merely reading a
    /// file would register as a modification on the next scan.
    pub include_access_time: bool,
}
impl Default for ScanOptions {
    fn default() -> Self {
        Self { include_access_time: cfg!(windows) }
    }
}

/// Metadata of a live entry. Timestamps the platform can't report become
/// [`FileTime::INVALID`].
pub fn observe(metadata: &Metadata, options: &ScanOptions) -> FileMetadata {
    let written = FileTime::from_io(metadata.modified());
    let last_modified = if options.include_access_time {
        written.max(FileTime::from_io(metadata.accessed()))
    } else {
        written
    };
    let created = FileTime::from_io(metadata.created());
    let properties = if metadata.is_dir() {
        FileMetadataHashableProperties::directory(last_modified, created)
    } else {
        FileMetadataHashableProperties::file(metadata.len(), last_modified, created)
    };
    FileMetadata::from(properties)
}
