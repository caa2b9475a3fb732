mod change;
mod sync;

pub(crate) use self::change::{ChangeRow, MetadataColumns};
pub(crate) use self::sync::{SyncRow, SyncedObjectRow};
