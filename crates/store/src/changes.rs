//! Change event store.
//!
//! Each pending [`FileChange`] is one row of `file_changes`, tagged with the
//! sync that was latest when it was recorded (or NULL before the first sync).
//! The free functions take an explicit connection so they can be composed
//! inside a caller's transaction; [`ChangeRepository`] wraps them for
//! standalone use, one durable unit per call.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{ChangeRow, MetadataColumns};
use crate::types::ChangeTypeTable;
use driftsync_index::{EventId, FileChange, SyncId};
use exn::{OptionExt, ResultExt};
use sqlx::{SqliteConnection, SqlitePool};
use time::UtcDateTime;
use tracing::instrument;

/// Inserts `change` and returns the id the store assigned to it.
pub async fn insert(conn: &mut SqliteConnection, types: &ChangeTypeTable, change: &FileChange) -> Result<EventId> {
    let columns = MetadataColumns::try_from(&change.metadata)?;
    let result = sqlx::query(include_str!("../queries/insert_change.sql"))
        .bind(types.id_of(change.change_type))
        .bind(change.new_path.as_str())
        .bind(change.old_path.as_ref().map(|path| path.as_str()))
        .bind(columns.is_directory)
        .bind(columns.last_modified)
        .bind(columns.created)
        .bind(columns.size)
        .bind(columns.revision)
        .bind(UtcDateTime::now().unix_timestamp())
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(EventId(result.last_insert_rowid()))
}

/// Changes recorded while `sync_id` was the latest sync (`None`: before the
/// first sync), oldest first.
pub async fn for_sync(
    conn: &mut SqliteConnection,
    types: &ChangeTypeTable,
    sync_id: Option<&SyncId>,
) -> Result<Vec<FileChange>> {
    let rows: Vec<ChangeRow> = sqlx::query_as(include_str!("../queries/list_changes_for_sync.sql"))
        .bind(sync_id.map(SyncId::as_str))
        .fetch_all(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    rows.into_iter().map(|row| row.into_change(types)).collect()
}

/// Same as [`for_sync`] with the latest sync looked up by the query itself.
pub async fn since_latest_sync(conn: &mut SqliteConnection, types: &ChangeTypeTable) -> Result<Vec<FileChange>> {
    let rows: Vec<ChangeRow> = sqlx::query_as(include_str!("../queries/list_changes_since_latest_sync.sql"))
        .fetch_all(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    rows.into_iter().map(|row| row.into_change(types)).collect()
}

/// Rewrites the stored metadata of an already persisted change.
pub async fn refresh(conn: &mut SqliteConnection, change: &FileChange) -> Result<()> {
    let event_id = change.event_id.ok_or_raise(|| ErrorKind::InvalidData("change has no event id"))?;
    let columns = MetadataColumns::try_from(&change.metadata)?;
    sqlx::query(include_str!("../queries/refresh_change.sql"))
        .bind(columns.is_directory)
        .bind(columns.last_modified)
        .bind(columns.created)
        .bind(columns.size)
        .bind(columns.revision)
        .bind(event_id.0)
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

/// Moves a change to another sync. Used to carry unsynced changes forward.
pub async fn reassign(conn: &mut SqliteConnection, event_id: EventId, sync_id: &SyncId) -> Result<()> {
    sqlx::query(include_str!("../queries/reassign_change.sql"))
        .bind(sync_id.as_str())
        .bind(event_id.0)
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

/// Returns the number of rows removed (zero when the id is unknown).
pub async fn delete(conn: &mut SqliteConnection, event_id: EventId) -> Result<u64> {
    let result = sqlx::query(include_str!("../queries/delete_change.sql"))
        .bind(event_id.0)
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(result.rows_affected())
}

/// Repository for pending change events.
#[derive(Debug, Clone)]
pub struct ChangeRepository {
    pool: SqlitePool,
    types: ChangeTypeTable,
}
impl From<&Database> for ChangeRepository {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone(), *db.change_types())
    }
}
impl ChangeRepository {
    pub fn new(pool: SqlitePool, types: ChangeTypeTable) -> Self {
        Self { pool, types }
    }

    /// Persists `change` and returns its event id.
    ///
    /// Changes flagged `do_not_persist` already have a row: nothing is written
    /// and their existing id is returned.
    #[instrument(level = "debug", skip_all, fields(path = %change.new_path, kind = %change.change_type))]
    pub async fn add(&self, change: &FileChange) -> Result<EventId> {
        if change.do_not_persist {
            return change.event_id.ok_or_raise(|| ErrorKind::InvalidData("stored change has no event id"));
        }
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        let event_id = insert(&mut *conn, &self.types, change).await?;
        tracing::debug!(event_id = %event_id, "recorded change");
        Ok(event_id)
    }

    pub async fn refresh(&self, change: &FileChange) -> Result<()> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        refresh(&mut *conn, change).await
    }

    /// Removing an unknown id is not an error.
    pub async fn remove(&self, event_id: EventId) -> Result<u64> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        delete(&mut *conn, event_id).await
    }

    /// Removes every listed event in one transaction.
    pub async fn remove_many(&self, event_ids: &[EventId]) -> Result<u64> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let mut removed = 0;
        for event_id in event_ids {
            removed += delete(&mut *tx, *event_id).await?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(removed)
    }

    /// Pending changes of the latest sync, oldest first. Every returned change
    /// carries its event id and is flagged `do_not_persist`.
    pub async fn events_since_latest_sync(&self) -> Result<Vec<FileChange>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        since_latest_sync(&mut *conn, &self.types).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline;
    use driftsync_index::{ChangeType, FileMetadata, FileMetadataHashableProperties, FileTime, TreePath};

    fn p(path: &str) -> TreePath {
        TreePath::new(path).unwrap()
    }

    fn file(size: u64) -> FileMetadata {
        FileMetadataHashableProperties::file(size, FileTime::from_nanos(1_000), FileTime::from_nanos(500)).into()
    }

    async fn repo() -> (Database, ChangeRepository) {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = ChangeRepository::from(&db);
        (db, repo)
    }

    #[tokio::test]
    async fn test_add_assigns_increasing_ids() {
        let (_db, repo) = repo().await;
        let first = repo.add(&FileChange::created(p("/r/a"), file(1))).await.unwrap();
        let second = repo.add(&FileChange::modified(p("/r/a"), file(2))).await.unwrap();
        assert!(second > first);
        let events = repo.events_since_latest_sync().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_id, Some(first));
        assert_eq!(events[1].change_type, ChangeType::Modified);
        assert!(events.iter().all(|event| event.do_not_persist));
    }

    #[tokio::test]
    async fn test_add_skips_stored_changes() {
        let (_db, repo) = repo().await;
        let stored = FileChange::created(p("/r/a"), file(1)).stored(EventId(41));
        assert_eq!(repo.add(&stored).await.unwrap(), EventId(41));
        assert!(repo.events_since_latest_sync().await.unwrap().is_empty());

        let mut broken = FileChange::created(p("/r/a"), file(1));
        broken.do_not_persist = true;
        let err = repo.add(&broken).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidData(_)));
    }

    #[tokio::test]
    async fn test_rename_round_trip() {
        let (_db, repo) = repo().await;
        let dir = FileMetadata::from(FileMetadataHashableProperties::directory(FileTime::INVALID, FileTime::INVALID));
        repo.add(&FileChange::renamed(p("/r/X"), p("/r/Y"), dir.clone())).await.unwrap();
        let events = repo.events_since_latest_sync().await.unwrap();
        assert_eq!(events[0].old_path, Some(p("/r/X")));
        assert_eq!(events[0].new_path, p("/r/Y"));
        assert_eq!(events[0].metadata, dir);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (_db, repo) = repo().await;
        let id = repo.add(&FileChange::deleted(p("/r/a"), file(1))).await.unwrap();
        assert_eq!(repo.remove(id).await.unwrap(), 1);
        assert_eq!(repo.remove(id).await.unwrap(), 0);
        assert_eq!(repo.remove(EventId(9_999)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_many() {
        let (_db, repo) = repo().await;
        let a = repo.add(&FileChange::created(p("/r/a"), file(1))).await.unwrap();
        let b = repo.add(&FileChange::created(p("/r/b"), file(1))).await.unwrap();
        let c = repo.add(&FileChange::created(p("/r/c"), file(1))).await.unwrap();
        assert_eq!(repo.remove_many(&[a, c, EventId(9_999)]).await.unwrap(), 2);
        let remaining: Vec<_> = repo.events_since_latest_sync().await.unwrap().into_iter().map(|e| e.event_id).collect();
        assert_eq!(remaining, vec![Some(b)]);
    }

    #[tokio::test]
    async fn test_refresh_rewrites_metadata() {
        let (_db, repo) = repo().await;
        let id = repo.add(&FileChange::modified(p("/r/a"), file(1))).await.unwrap();
        let mut change = repo.events_since_latest_sync().await.unwrap().remove(0);
        change.metadata = file(99).with_revision("r2");
        repo.refresh(&change).await.unwrap();
        let reloaded = repo.events_since_latest_sync().await.unwrap().remove(0);
        assert_eq!(reloaded.event_id, Some(id));
        assert_eq!(reloaded.metadata, change.metadata);
    }

    #[tokio::test]
    async fn test_changes_follow_latest_sync() {
        let (db, repo) = repo().await;
        let before = repo.add(&FileChange::created(p("/r/a"), file(1))).await.unwrap();
        let mut tx = db.pool().begin().await.unwrap();
        baseline::insert_sync(&mut *tx, &SyncId::from("s1"), &p("/r"), UtcDateTime::now()).await.unwrap();
        tx.commit().await.unwrap();

        // Rows from before the first sync stay attached to NULL.
        assert!(repo.events_since_latest_sync().await.unwrap().is_empty());
        let after = repo.add(&FileChange::created(p("/r/b"), file(1))).await.unwrap();
        let events = repo.events_since_latest_sync().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_id, Some(after));

        let mut conn = db.pool().acquire().await.unwrap();
        let orphans = for_sync(&mut *conn, db.change_types(), None).await.unwrap();
        assert_eq!(orphans[0].event_id, Some(before));
        reassign(&mut *conn, before, &SyncId::from("s1")).await.unwrap();
        let moved = for_sync(&mut *conn, db.change_types(), Some(&SyncId::from("s1"))).await.unwrap();
        let ids: Vec<_> = moved.iter().map(|e| e.event_id.unwrap()).collect();
        assert_eq!(ids, vec![before, after]);
    }
}
