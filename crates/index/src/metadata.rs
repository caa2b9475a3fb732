//! File metadata and the comparison used to detect drift.

use std::hash::{Hash, Hasher};
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;

/// A file-system timestamp in nanoseconds since the Unix epoch.
///
/// Zero is reserved as the "unknown/invalid" sentinel ([`FileTime::INVALID`])
/// rather than wrapping everything in an `Option`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileTime(i64);
impl FileTime {
    pub const INVALID: Self = Self(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn as_nanos(&self) -> i64 {
        self.0
    }

    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Timestamps that don't fit in an `i64` of nanoseconds (years before
    /// ~1678 or after ~2262) become the sentinel.
    pub fn from_system_time(time: SystemTime) -> Self {
        let nanos = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => i64::try_from(after.as_nanos()).ok(),
            Err(before) => i64::try_from(before.duration().as_nanos()).ok().and_then(i64::checked_neg),
        };
        nanos.map(Self).unwrap_or(Self::INVALID)
    }

    /// Uses the sentinel when the platform couldn't provide the timestamp.
    pub fn from_io(time: std::io::Result<SystemTime>) -> Self {
        time.map(Self::from_system_time).unwrap_or(Self::INVALID)
    }

    pub fn to_datetime(&self) -> Option<OffsetDateTime> {
        if !self.is_valid() {
            return None;
        }
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0)).ok()
    }
}

/// The subset of file metadata that decides whether a file changed.
#[derive(Debug, Clone, Copy)]
pub struct FileMetadataHashableProperties {
    pub is_directory: bool,
    pub last_modified_time: FileTime,
    pub creation_time: FileTime,
    /// Always `None` for directories.
    pub size: Option<u64>,
}
impl FileMetadataHashableProperties {
    pub fn file(size: u64, last_modified_time: FileTime, creation_time: FileTime) -> Self {
        Self { is_directory: false, last_modified_time, creation_time, size: Some(size) }
    }

    pub fn directory(last_modified_time: FileTime, creation_time: FileTime) -> Self {
        Self { is_directory: true, last_modified_time, creation_time, size: None }
    }
}
impl PartialEq for FileMetadataHashableProperties {
    /// Directories compare type and timestamps; files also compare size.
    fn eq(&self, other: &Self) -> bool {
        if self.is_directory != other.is_directory
            || self.last_modified_time != other.last_modified_time
            || self.creation_time != other.creation_time
        {
            return false;
        }
        self.is_directory || self.size == other.size
    }
}
impl Eq for FileMetadataHashableProperties {}
impl Hash for FileMetadataHashableProperties {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.is_directory.hash(state);
        self.last_modified_time.hash(state);
        self.creation_time.hash(state);
        if !self.is_directory {
            self.size.hash(state);
        }
    }
}

/// Returns `true` when `a` and `b` describe the same on-disk state.
pub fn metadata_equals(a: &FileMetadataHashableProperties, b: &FileMetadataHashableProperties) -> bool {
    a == b
}

/// Metadata recorded for a path.
///
/// Only [`properties`](Self::properties) takes part in drift detection; the
/// rest is carried along for the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub properties: FileMetadataHashableProperties,
    /// Opaque revision tag assigned by the remote side, if any.
    pub revision: Option<String>,
}
impl FileMetadata {
    pub fn is_directory(&self) -> bool {
        self.properties.is_directory
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    /// Same on-disk state, ignoring the non-hashable attributes.
    pub fn same_state(&self, other: &Self) -> bool {
        metadata_equals(&self.properties, &other.properties)
    }
}
impl From<FileMetadataHashableProperties> for FileMetadata {
    fn from(properties: FileMetadataHashableProperties) -> Self {
        Self { properties, revision: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::hash_map::DefaultHasher;
    use std::time::Duration;

    const T1: FileTime = FileTime::from_nanos(1_700_000_000_000_000_000);
    const T2: FileTime = FileTime::from_nanos(1_700_000_001_000_000_000);

    fn hash_of(props: &FileMetadataHashableProperties) -> u64 {
        let mut hasher = DefaultHasher::new();
        props.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_sentinel_equals_sentinel() {
        let a = FileMetadataHashableProperties::file(5, FileTime::INVALID, FileTime::INVALID);
        let b = FileMetadataHashableProperties::file(5, FileTime::INVALID, FileTime::INVALID);
        assert!(metadata_equals(&a, &b));
    }

    #[rstest]
    #[case(FileMetadataHashableProperties::file(5, T1, FileTime::INVALID))]
    #[case(FileMetadataHashableProperties::file(5, FileTime::INVALID, T1))]
    fn test_sentinel_differs_from_real(#[case] real: FileMetadataHashableProperties) {
        let sentinel = FileMetadataHashableProperties::file(5, FileTime::INVALID, FileTime::INVALID);
        assert!(!metadata_equals(&sentinel, &real));
        assert!(!metadata_equals(&real, &sentinel));
    }

    #[rstest]
    #[case(FileMetadataHashableProperties::file(6, T1, T1), false)]
    #[case(FileMetadataHashableProperties::file(5, T2, T1), false)]
    #[case(FileMetadataHashableProperties::file(5, T1, T2), false)]
    #[case(FileMetadataHashableProperties::directory(T1, T1), false)]
    #[case(FileMetadataHashableProperties::file(5, T1, T1), true)]
    fn test_file_comparison(#[case] other: FileMetadataHashableProperties, #[case] expected: bool) {
        let base = FileMetadataHashableProperties::file(5, T1, T1);
        assert_eq!(metadata_equals(&base, &other), expected);
    }

    #[test]
    fn test_directories_ignore_size() {
        let a = FileMetadataHashableProperties::directory(T1, T2);
        let b = FileMetadataHashableProperties { size: Some(4096), ..a };
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        let c = FileMetadataHashableProperties::directory(T2, T2);
        assert_ne!(a, c);
    }

    #[test]
    fn test_revision_is_not_state() {
        let a = FileMetadata::from(FileMetadataHashableProperties::file(5, T1, T1));
        let b = a.clone().with_revision("r42");
        assert!(a.same_state(&b));
        assert_ne!(a, b);
    }

    #[rstest]
    #[case(UNIX_EPOCH + Duration::from_secs(400_000_000_000))]
    #[case(UNIX_EPOCH + Duration::from_secs(10_000_000_000))]
    #[case(UNIX_EPOCH - Duration::from_secs(10_000_000_000))]
    fn test_out_of_range_time_is_invalid(#[case] time: SystemTime) {
        assert_eq!(FileTime::from_system_time(time), FileTime::INVALID);
        assert_eq!(FileTime::from_io(Ok(time)), FileTime::INVALID);
    }

    #[test]
    fn test_time_before_epoch() {
        let time = UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(FileTime::from_system_time(time), FileTime::from_nanos(-1_000_000_000));
    }

    #[test]
    fn test_file_time_conversion() {
        let time = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let converted = FileTime::from_system_time(time);
        assert_eq!(converted, T1);
        assert!(converted.is_valid());
        assert_eq!(converted.to_datetime().unwrap().unix_timestamp(), 1_700_000_000);
        assert!(FileTime::INVALID.to_datetime().is_none());
        let failed: std::io::Result<SystemTime> = Err(std::io::Error::other("unsupported"));
        assert_eq!(FileTime::from_io(failed), FileTime::INVALID);
    }
}
