//! SQLite storage for pending change events and completed sync baselines.
//!
//! The database is the durable half of the engine: every recorded change
//! event lives in `file_changes` until a sync consumes it, and every
//! completed sync leaves a full snapshot of the tree behind.
//!
//! # Architecture
//! - **Changes**: one row per pending [`FileChange`](driftsync_index::FileChange),
//!   tagged with the sync that was latest when it was recorded.
//! - **Syncs**: one row per completed sync, ordered by commit sequence, each
//!   owning its snapshot of synced objects (and their server links).
//!
//! Both modules expose free functions over `&mut SqliteConnection` for use
//! inside a caller-owned transaction, plus a repository for standalone calls.

pub mod baseline;
pub mod changes;
mod db;
pub mod error;
mod models;
mod types;

pub use crate::baseline::BaselineRepository;
pub use crate::changes::ChangeRepository;
pub use crate::db::Database;
pub use crate::types::ChangeTypeTable;
pub use sqlx::SqliteConnection;
