//! Sync baseline store.
//!
//! A completed sync is a row of `syncs` plus its snapshot in
//! `synced_objects`. The row with the highest commit sequence is the live
//! baseline; older snapshots are kept.

use crate::Database;
use crate::changes;
use crate::error::{ErrorKind, Result};
use crate::models::{MetadataColumns, SyncRow, SyncedObjectRow};
use driftsync_index::{EventId, SyncId, SyncPoint, SyncedObject, TreePath};
use exn::ResultExt;
use sqlx::{SqliteConnection, SqlitePool};
use time::UtcDateTime;

pub async fn latest(conn: &mut SqliteConnection) -> Result<Option<SyncPoint>> {
    let row: Option<SyncRow> = sqlx::query_as(include_str!("../queries/latest_sync.sql"))
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(SyncPoint::try_from).transpose()
}

pub async fn get(conn: &mut SqliteConnection, sync_id: &SyncId) -> Result<Option<SyncPoint>> {
    let row: Option<SyncRow> = sqlx::query_as(include_str!("../queries/get_sync.sql"))
        .bind(sync_id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    row.map(SyncPoint::try_from).transpose()
}

/// All syncs, oldest first.
pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<SyncPoint>> {
    let rows: Vec<SyncRow> = sqlx::query_as(include_str!("../queries/list_syncs.sql"))
        .fetch_all(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    rows.into_iter().map(SyncPoint::try_from).collect()
}

/// The snapshot of `sync_id`, server links included, ordered by path.
pub async fn synced_objects(conn: &mut SqliteConnection, sync_id: &SyncId) -> Result<Vec<SyncedObject>> {
    let rows: Vec<SyncedObjectRow> = sqlx::query_as(include_str!("../queries/list_synced_objects.sql"))
        .bind(sync_id.as_str())
        .fetch_all(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    rows.into_iter().map(SyncedObject::try_from).collect()
}

/// Fails with [`ErrorKind::Database`] when `sync_id` already exists.
pub async fn insert_sync(
    conn: &mut SqliteConnection,
    sync_id: &SyncId,
    root_path: &TreePath,
    completed_at: UtcDateTime,
) -> Result<()> {
    sqlx::query(include_str!("../queries/insert_sync.sql"))
        .bind(sync_id.as_str())
        .bind(root_path.as_str())
        .bind(completed_at.unix_timestamp())
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    Ok(())
}

/// Adds `object` to the snapshot of `sync_id`, with its server link if it has one.
pub async fn insert_synced_object(conn: &mut SqliteConnection, sync_id: &SyncId, object: &SyncedObject) -> Result<()> {
    let columns = MetadataColumns::try_from(&object.metadata)?;
    let result = sqlx::query(include_str!("../queries/insert_synced_object.sql"))
        .bind(sync_id.as_str())
        .bind(object.local_path.as_str())
        .bind(columns.is_directory)
        .bind(columns.last_modified)
        .bind(columns.created)
        .bind(columns.size)
        .bind(columns.revision)
        .execute(&mut *conn)
        .await
        .or_raise(|| ErrorKind::Database)?;
    if let Some(server_path) = &object.server_linked_path {
        sqlx::query(include_str!("../queries/insert_server_link.sql"))
            .bind(result.last_insert_rowid())
            .bind(server_path.as_str())
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
    }
    Ok(())
}

/// Writes `sync` as the new latest sync with its snapshot, and carries the
/// `still_pending` changes over to it.
///
/// Meant to run inside the caller's transaction, so that nothing of the new
/// sync is visible unless everything is.
pub async fn commit_new_sync(
    conn: &mut SqliteConnection,
    sync: &SyncPoint,
    objects: &[SyncedObject],
    still_pending: &[EventId],
) -> Result<()> {
    insert_sync(&mut *conn, &sync.id, &sync.root_path, sync.completed_at).await?;
    for object in objects {
        insert_synced_object(&mut *conn, &sync.id, object).await?;
    }
    for event_id in still_pending {
        changes::reassign(&mut *conn, *event_id, &sync.id).await?;
    }
    Ok(())
}

/// Read access to completed syncs, plus [`commit_new_sync`] in a transaction
/// of its own. Writing a new sync is done by the engine,
/// inside its own transaction, with the free functions of this module.
#[derive(Debug, Clone)]
pub struct BaselineRepository {
    pool: SqlitePool,
}
impl From<&Database> for BaselineRepository {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl BaselineRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn latest(&self) -> Result<Option<SyncPoint>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        latest(&mut *conn).await
    }

    pub async fn get(&self, sync_id: &SyncId) -> Result<Option<SyncPoint>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        get(&mut *conn, sync_id).await
    }

    pub async fn synced_objects_for(&self, sync_id: &SyncId) -> Result<Vec<SyncedObject>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        synced_objects(&mut *conn, sync_id).await
    }

    /// The latest sync and its snapshot, read in one transaction.
    pub async fn latest_with_objects(&self) -> Result<Option<(SyncPoint, Vec<SyncedObject>)>> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let Some(sync) = latest(&mut *tx).await? else {
            return Ok(None);
        };
        let objects = synced_objects(&mut *tx, &sync.id).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(Some((sync, objects)))
    }

    pub async fn list_syncs(&self) -> Result<Vec<SyncPoint>> {
        let mut conn = self.pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        list(&mut *conn).await
    }

    pub async fn commit_new_sync(&self, sync: &SyncPoint, objects: &[SyncedObject], still_pending: &[EventId]) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        commit_new_sync(&mut *tx, sync, objects, still_pending).await?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_index::{FileMetadata, FileMetadataHashableProperties, FileTime};

    fn p(path: &str) -> TreePath {
        TreePath::new(path).unwrap()
    }

    fn object(path: &str) -> SyncedObject {
        let metadata: FileMetadata =
            FileMetadataHashableProperties::file(3, FileTime::from_nanos(20), FileTime::from_nanos(10)).into();
        SyncedObject::new(p(path), metadata)
    }

    async fn commit(db: &Database, id: &str, objects: &[SyncedObject]) {
        let sync_id = SyncId::from(id);
        let mut tx = db.pool().begin().await.unwrap();
        insert_sync(&mut *tx, &sync_id, &p("/r"), UtcDateTime::now()).await.unwrap();
        for object in objects {
            insert_synced_object(&mut *tx, &sync_id, object).await.unwrap();
        }
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_sync_yet() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = BaselineRepository::from(&db);
        assert!(repo.latest().await.unwrap().is_none());
        assert!(repo.latest_with_objects().await.unwrap().is_none());
        assert!(repo.list_syncs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_follows_commit_order() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = BaselineRepository::from(&db);
        // Ids are opaque: commit order decides, not lexical order.
        commit(&db, "zz", &[object("/r/old.txt")]).await;
        commit(&db, "aa", &[object("/r/b.txt"), object("/r/a.txt").with_server_link(p("/srv/a.txt"))]).await;

        let (sync, objects) = repo.latest_with_objects().await.unwrap().unwrap();
        assert_eq!(sync.id.as_str(), "aa");
        assert_eq!(sync.root_path, p("/r"));
        let paths: Vec<_> = objects.iter().map(|o| o.local_path.as_str()).collect();
        assert_eq!(paths, vec!["/r/a.txt", "/r/b.txt"]);
        assert_eq!(objects[0].server_linked_path, Some(p("/srv/a.txt")));
        assert_eq!(objects[1].server_linked_path, None);

        let history: Vec<_> = repo.list_syncs().await.unwrap().into_iter().map(|s| s.id).collect();
        assert_eq!(history, vec![SyncId::from("zz"), SyncId::from("aa")]);
        assert_eq!(repo.synced_objects_for(&SyncId::from("zz")).await.unwrap().len(), 1);
        assert!(repo.get(&SyncId::from("zz")).await.unwrap().is_some());
        assert!(repo.get(&SyncId::from("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_new_sync_is_all_or_nothing() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = BaselineRepository::from(&db);
        let changes = crate::ChangeRepository::from(&db);
        let pending = changes
            .add(&driftsync_index::FileChange::created(p("/r/new.txt"), object("/r/new.txt").metadata))
            .await
            .unwrap();
        let sync = SyncPoint { id: SyncId::from("s1"), root_path: p("/r"), completed_at: UtcDateTime::now() };

        // The same path twice violates the snapshot's unique constraint.
        let broken = [object("/r/a"), object("/r/a")];
        assert!(repo.commit_new_sync(&sync, &broken, &[pending]).await.is_err());
        assert!(repo.latest().await.unwrap().is_none());
        assert_eq!(changes.events_since_latest_sync().await.unwrap().len(), 1);

        repo.commit_new_sync(&sync, &[object("/r/a")], &[pending]).await.unwrap();
        assert_eq!(repo.latest().await.unwrap().unwrap().id, sync.id);
        assert_eq!(repo.synced_objects_for(&sync.id).await.unwrap().len(), 1);
        let carried = changes.events_since_latest_sync().await.unwrap();
        assert_eq!(carried[0].event_id, Some(pending));
    }

    #[tokio::test]
    async fn test_commit_overlapping_a_new_event() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect(dir.path().join("driftsync.db")).await.unwrap();
        let changes = crate::ChangeRepository::from(&db);
        let first = driftsync_index::FileChange::created(p("/r/a.txt"), object("/r/a.txt").metadata);
        let synced = changes.add(&first).await.unwrap();

        // Same shape as a sync commit: reads first, writes later.
        let mut tx = db.begin_write().await.unwrap();
        assert!(latest(&mut *tx).await.unwrap().is_none());
        let pending = crate::changes::for_sync(&mut *tx, db.change_types(), None).await.unwrap();
        assert_eq!(pending.len(), 1);

        let watcher = changes.clone();
        let second = driftsync_index::FileChange::created(p("/r/b.txt"), object("/r/b.txt").metadata);
        let add = tokio::spawn(async move { watcher.add(&second).await });
        // Give the watcher's insert a chance to reach SQLite and queue up.
        tokio::task::yield_now().await;
        std::thread::sleep(std::time::Duration::from_millis(100));

        crate::changes::delete(&mut *tx, synced).await.unwrap();
        let sync = SyncPoint { id: SyncId::from("s1"), root_path: p("/r"), completed_at: UtcDateTime::now() };
        commit_new_sync(&mut *tx, &sync, &[object("/r/a.txt")], &[]).await.unwrap();
        tx.commit().await.unwrap();

        let added = add.await.unwrap().unwrap();
        let pending = changes.events_since_latest_sync().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_id, Some(added));
        db.close().await;
    }

    #[tokio::test]
    async fn test_duplicate_sync_id_is_rejected() {
        let db = Database::connect_in_memory().await.unwrap();
        commit(&db, "s1", &[]).await;
        let mut conn = db.pool().acquire().await.unwrap();
        let err = insert_sync(&mut *conn, &SyncId::from("s1"), &p("/r"), UtcDateTime::now()).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Database);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_duplicate_path_in_snapshot_is_rejected() {
        let db = Database::connect_in_memory().await.unwrap();
        commit(&db, "s1", &[]).await;
        let mut conn = db.pool().acquire().await.unwrap();
        let sync_id = SyncId::from("s1");
        insert_synced_object(&mut *conn, &sync_id, &object("/r/a")).await.unwrap();
        assert!(insert_synced_object(&mut *conn, &sync_id, &object("/r/a")).await.is_err());
    }
}
