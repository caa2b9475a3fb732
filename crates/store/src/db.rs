//! SQLite pool shared by the change and baseline stores.

use exn::ResultExt;
use sqlx::sqlite::{
    SqliteAutoVacuum, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::types::ChangeTypeTable;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
/// Index builds keep a read transaction open while the watcher appends.
const FILE_POOL_SIZE: u32 = 5;
/// How long a writer queues behind another one before failing with
/// `SQLITE_BUSY`. A sync commit rewrites the whole snapshot.
const LOCK_WAIT: Duration = Duration::from_secs(5);

/// Handle to the driftsync database.
///
/// Carries the [`ChangeTypeTable`] read at connect time next to the pool;
/// every change row is written and read through it.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    change_types: ChangeTypeTable,
}

impl Database {
    /// Opens the database file at `path`, creating and migrating it as needed.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = Self::options().filename(path.as_ref()).create_if_missing(true);
        Self::open(options, FILE_POOL_SIZE).await
    }

    /// A private in-memory database.
    ///
    /// Not behind `#[cfg(test)]`: the engine's tests use it too.
    pub async fn connect_in_memory() -> Result<Self> {
        // Each connection to ":memory:" would get a database of its own.
        Self::open(Self::options().filename(":memory:"), 1).await
    }

    #[instrument(level = "debug", skip(options))]
    async fn open(options: SqliteConnectOptions, pool_size: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Self::migrate(&pool).await?;
        let mut conn = pool.acquire().await.or_raise(|| ErrorKind::Database)?;
        let change_types = ChangeTypeTable::load(&mut *conn).await?;
        drop(conn);
        Ok(Self { pool, change_types })
    }

    /// Connection settings. The pragmas are applied to every pooled
    /// connection when it is opened.
    fn options() -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(LOCK_WAIT)
            .auto_vacuum(SqliteAutoVacuum::None)
            .pragma("wal_autocheckpoint", "800")
            .pragma("temp_store", "MEMORY")
    }

    #[instrument("migrating driftsync database", skip_all)]
    async fn migrate(pool: &SqlitePool) -> Result<()> {
        MIGRATOR.run(pool).await.or_raise(|| ErrorKind::Migration)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn change_types(&self) -> &ChangeTypeTable {
        &self.change_types
    }

    /// Starts a transaction that takes the write lock up front.
    ///
    /// Use it for transactions that read before they write. A deferred
    /// transaction fails with `SQLITE_BUSY_SNAPSHOT` (no waiting) when
    /// another connection commits between its first read and its first
    /// write; this one queues behind other writers instead.
    pub async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool.begin_with("BEGIN IMMEDIATE").await.or_raise(|| ErrorKind::Database)
    }

    /// Closes the pool once every connection has been returned. Don't use
    /// the handle afterwards.
    pub async fn close(&self) {
        _ = sqlx::query("PRAGMA optimize").execute(&self.pool).await;
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_index::ChangeType;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = Database::connect_in_memory().await.unwrap();
        assert!(!db.pool().is_closed());
        assert_eq!(db.change_types().kind_of(db.change_types().id_of(ChangeType::Modified)).unwrap(), ChangeType::Modified);
        db.close().await;
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::connect_in_memory().await.unwrap();
        Database::migrate(db.pool()).await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_pragmas_are_applied() {
        let db = Database::connect_in_memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("PRAGMA foreign_keys").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 1);
        let row: (i64,) = sqlx::query_as("PRAGMA wal_autocheckpoint").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, 800);
        db.close().await;
    }

    #[tokio::test]
    async fn test_connect_file_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("driftsync.db");
        let db = Database::connect(&path).await.unwrap();
        db.close().await;
        assert!(path.exists());
        let db = Database::connect(&path).await.unwrap();
        assert_eq!(db.change_types().id_of(ChangeType::Created), 1);
        let row: (String,) = sqlx::query_as("PRAGMA journal_mode").fetch_one(db.pool()).await.unwrap();
        assert_eq!(row.0, "wal");
        db.close().await;
    }

    #[tokio::test]
    async fn test_begin_write_takes_the_lock() {
        let db = Database::connect_in_memory().await.unwrap();
        let mut tx = db.begin_write().await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM syncs").fetch_one(&mut *tx).await.unwrap();
        assert_eq!(row.0, 0);
        tx.commit().await.unwrap();
    }
}
