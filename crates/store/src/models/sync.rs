use crate::error::{Error, ErrorKind, Result};
use crate::models::MetadataColumns;
use driftsync_index::{FileMetadata, SyncId, SyncPoint, SyncedObject, TreePath};
use exn::ResultExt;
use time::UtcDateTime;

#[derive(sqlx::FromRow)]
pub(crate) struct SyncRow {
    pub sync_id: String,
    pub root_path: String,
    pub completed_at: i64,
}
impl TryFrom<SyncRow> for SyncPoint {
    type Error = Error;
    fn try_from(row: SyncRow) -> Result<Self> {
        Ok(Self {
            id: SyncId::from(row.sync_id),
            root_path: row.root_path.parse::<TreePath>().or_raise(|| ErrorKind::InvalidData("root path"))?,
            completed_at: UtcDateTime::from_unix_timestamp(row.completed_at)
                .or_raise(|| ErrorKind::InvalidData("completion date"))?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SyncedObjectRow {
    pub local_path: String,
    pub server_path: Option<String>,
    #[sqlx(flatten)]
    pub metadata: MetadataColumns,
}
impl TryFrom<SyncedObjectRow> for SyncedObject {
    type Error = Error;
    fn try_from(row: SyncedObjectRow) -> Result<Self> {
        Ok(Self {
            local_path: row.local_path.parse::<TreePath>().or_raise(|| ErrorKind::InvalidData("local path"))?,
            server_linked_path: row
                .server_path
                .map(|path| path.parse::<TreePath>())
                .transpose()
                .or_raise(|| ErrorKind::InvalidData("server path"))?,
            metadata: FileMetadata::try_from(row.metadata)?,
        })
    }
}
