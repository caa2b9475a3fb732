use crate::error::{Error, ErrorKind, Result};
use crate::types::ChangeTypeTable;
use driftsync_index::{EventId, FileChange, FileMetadata, FileMetadataHashableProperties, FileTime, TreePath};
use exn::ResultExt;

/// Metadata columns shared by `file_changes` and `synced_objects`.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct MetadataColumns {
    pub is_directory: bool,
    pub last_modified: i64,
    pub created: i64,
    pub size: Option<i64>,
    pub revision: Option<String>,
}
impl TryFrom<&FileMetadata> for MetadataColumns {
    type Error = Error;
    fn try_from(metadata: &FileMetadata) -> Result<Self> {
        let props = &metadata.properties;
        let size = match (props.is_directory, props.size) {
            (true, _) | (false, None) => None,
            (false, Some(size)) => Some(i64::try_from(size).or_raise(|| ErrorKind::InvalidData("file size"))?),
        };
        Ok(Self {
            is_directory: props.is_directory,
            last_modified: props.last_modified_time.as_nanos(),
            created: props.creation_time.as_nanos(),
            size,
            revision: metadata.revision.clone(),
        })
    }
}
impl TryFrom<MetadataColumns> for FileMetadata {
    type Error = Error;
    fn try_from(row: MetadataColumns) -> Result<Self> {
        let last_modified = FileTime::from_nanos(row.last_modified);
        let created = FileTime::from_nanos(row.created);
        let properties = if row.is_directory {
            FileMetadataHashableProperties::directory(last_modified, created)
        } else {
            // A file stored without a size reads back without one.
            let size = row.size.map(u64::try_from).transpose().or_raise(|| ErrorKind::InvalidData("file size"))?;
            FileMetadataHashableProperties { size, ..FileMetadataHashableProperties::file(0, last_modified, created) }
        };
        Ok(Self { properties, revision: row.revision })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ChangeRow {
    pub event_id: i64,
    pub change_type: i64,
    pub new_path: String,
    pub old_path: Option<String>,
    #[sqlx(flatten)]
    pub metadata: MetadataColumns,
}
impl ChangeRow {
    /// Rows loaded back from the store are never inserted again.
    pub fn into_change(self, types: &ChangeTypeTable) -> Result<FileChange> {
        let change_type = types.kind_of(self.change_type)?;
        let new_path = self.new_path.parse::<TreePath>().or_raise(|| ErrorKind::InvalidData("path"))?;
        let old_path = self
            .old_path
            .map(|path| path.parse::<TreePath>())
            .transpose()
            .or_raise(|| ErrorKind::InvalidData("old path"))?;
        Ok(FileChange {
            new_path,
            old_path,
            change_type,
            metadata: FileMetadata::try_from(self.metadata)?,
            event_id: None,
            do_not_persist: false,
        }
        .stored(EventId(self.event_id)))
    }
}
