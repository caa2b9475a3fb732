use crate::build::IndexSnapshot;
use crate::error::{ErrorKind, Result};
use driftsync_config::Config;
use driftsync_index::{CaseSensitivity, EventId, FileChange, FileMetadata, PathIndex, SyncPoint, SyncedObject};
use driftsync_scan::{CancellationToken, ScanOptions};
use driftsync_store::{BaselineRepository, ChangeRepository, Database};
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Knobs of the reconciliation engine that aren't about storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub case_sensitivity: CaseSensitivity,
    pub scan: ScanOptions,
}
impl Default for EngineOptions {
    fn default() -> Self {
        Self { case_sensitivity: CaseSensitivity::platform(), scan: ScanOptions::default() }
    }
}
impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            case_sensitivity: config.case_sensitivity,
            scan: ScanOptions { include_access_time: config.scan.include_access_time },
        }
    }
}

#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) database: Database,
    pub(crate) changes: ChangeRepository,
    pub(crate) baselines: BaselineRepository,
    pub(crate) options: EngineOptions,
    pub(crate) default_root: Option<PathBuf>,
    /// Serializes `build_index` and `record_completed_sync`.
    pub(crate) lock: Mutex<()>,
    pub(crate) shutdown: CancellationToken,
}

/// Handle to the reconciliation engine. Cheap to clone; clones share the
/// database and the lock that serializes index builds and sync commits.
#[derive(Debug, Clone)]
pub struct Engine {
    pub(crate) inner: Arc<Inner>,
}

impl Engine {
    pub fn new(database: Database, options: EngineOptions) -> Self {
        Self::with_default_root(database, options, None)
    }

    /// Like [`new`](Self::new), with a root to fall back on when a call
    /// doesn't name one.
    pub fn with_default_root(database: Database, options: EngineOptions, default_root: Option<PathBuf>) -> Self {
        let inner = Inner {
            changes: ChangeRepository::from(&database),
            baselines: BaselineRepository::from(&database),
            database,
            options,
            default_root,
            lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        };
        Self { inner: Arc::new(inner) }
    }

    /// Opens (creating if needed) the database named by `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        config.validate().or_raise(|| ErrorKind::Config)?;
        if let Some(parent) = config.database.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).or_raise(|| ErrorKind::InvalidPath(parent.to_path_buf()))?;
        }
        let database = Database::connect(&config.database).await.or_raise(|| ErrorKind::Storage)?;
        tracing::info!(database = %config.database.display(), "opened engine database");
        Ok(Self::with_default_root(database, EngineOptions::from(config), config.root.clone()))
    }

    pub fn database(&self) -> &Database {
        &self.inner.database
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    /// The configured monitored root, if any.
    pub fn default_root(&self) -> Option<&Path> {
        self.inner.default_root.as_deref()
    }

    /// [`build_index`](Self::build_index) on the configured root.
    pub async fn build_default_index(&self, cancel: CancellationToken) -> Result<IndexSnapshot> {
        let Some(root) = self.default_root() else {
            exn::bail!(ErrorKind::Config);
        };
        self.build_index(root, cancel).await
    }

    /// Cancels running and future background index builds.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Builds the index in the background and hands the baseline and the
    /// change list to `on_index_built` once done.
    ///
    /// Failures are logged and the callback is not invoked.
    pub fn start_initial_indexing<P, F>(&self, root_path_provider: P, on_index_built: F) -> JoinHandle<()>
    where
        P: FnOnce() -> PathBuf + Send + 'static,
        F: FnOnce(PathIndex<FileMetadata>, Vec<FileChange>) + Send + 'static,
    {
        let engine = self.clone();
        tokio::spawn(async move {
            let root = root_path_provider();
            let cancel = engine.inner.shutdown.child_token();
            match engine.build_index(&root, cancel).await {
                Ok(snapshot) => on_index_built(snapshot.index, snapshot.changes),
                Err(e) => tracing::error!(root = %root.display(), error = ?e, "initial indexing failed"),
            }
        })
    }

    /// Records a change reported by a file system watcher. Returns the
    /// existing id of changes that are already stored.
    pub async fn add_event(&self, change: &FileChange) -> Result<EventId> {
        self.inner.changes.add(change).await.or_raise(|| ErrorKind::Storage)
    }

    /// Removing an unknown id is not an error.
    pub async fn remove_event_by_id(&self, event_id: EventId) -> Result<()> {
        self.inner.changes.remove(event_id).await.or_raise(|| ErrorKind::Storage)?;
        Ok(())
    }

    /// Removes all listed events at once. Returns how many existed.
    pub async fn remove_events_by_ids(&self, event_ids: &[EventId]) -> Result<u64> {
        self.inner.changes.remove_many(event_ids).await.or_raise(|| ErrorKind::Storage)
    }

    /// The latest sync and its baseline, if any sync completed yet.
    pub async fn get_last_sync_states(&self) -> Result<Option<(SyncPoint, Vec<SyncedObject>)>> {
        self.inner.baselines.latest_with_objects().await.or_raise(|| ErrorKind::Storage)
    }

    /// Changes recorded since the latest sync, oldest first.
    pub async fn get_events_since_last_sync(&self) -> Result<Vec<FileChange>> {
        self.inner.changes.events_since_latest_sync().await.or_raise(|| ErrorKind::Storage)
    }

    /// Every completed sync, oldest first.
    pub async fn list_syncs(&self) -> Result<Vec<SyncPoint>> {
        self.inner.baselines.list_syncs().await.or_raise(|| ErrorKind::Storage)
    }
}
