//! Mapping between [`ChangeType`] and rows of the `change_types` table.

use crate::error::{ErrorKind, Result};
use driftsync_index::ChangeType;
use exn::{OptionExt, ResultExt};
use sqlx::SqliteConnection;

/// Row ids of each [`ChangeType`], read once from the database when it is
/// opened and handed to whoever needs to read or write change rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeTypeTable {
    ids: [i64; 4],
}

const fn slot(kind: ChangeType) -> usize {
    match kind {
        ChangeType::Created => 0,
        ChangeType::Modified => 1,
        ChangeType::Deleted => 2,
        ChangeType::Renamed => 3,
    }
}

impl ChangeTypeTable {
    /// Builds the table from `(id, name)` rows. Every [`ChangeType`] must be
    /// present exactly once.
    pub fn from_rows(rows: impl IntoIterator<Item = (i64, String)>) -> Result<Self> {
        let mut ids: [Option<i64>; 4] = [None; 4];
        for (id, name) in rows {
            let kind = ChangeType::ALL
                .into_iter()
                .find(|kind| kind.as_str() == name)
                .ok_or_raise(|| ErrorKind::InvalidData("unknown change type"))?;
            if ids[slot(kind)].replace(id).is_some() {
                exn::bail!(ErrorKind::InvalidData("duplicate change type"));
            }
        }
        let mut resolved = [0; 4];
        for kind in ChangeType::ALL {
            resolved[slot(kind)] = ids[slot(kind)].ok_or_raise(|| ErrorKind::InvalidData("missing change type"))?;
        }
        Ok(Self { ids: resolved })
    }

    pub(crate) async fn load(conn: &mut SqliteConnection) -> Result<Self> {
        let rows: Vec<(i64, String)> = sqlx::query_as(include_str!("../queries/list_change_types.sql"))
            .fetch_all(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Self::from_rows(rows)
    }

    pub fn id_of(&self, kind: ChangeType) -> i64 {
        self.ids[slot(kind)]
    }

    pub fn kind_of(&self, id: i64) -> Result<ChangeType> {
        ChangeType::ALL
            .into_iter()
            .find(|kind| self.id_of(*kind) == id)
            .ok_or_raise(|| ErrorKind::InvalidData("change type id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<(i64, String)> {
        vec![
            (10, "created".to_string()),
            (20, "modified".to_string()),
            (30, "deleted".to_string()),
            (40, "renamed".to_string()),
        ]
    }

    #[test]
    fn test_round_trip_ids() {
        let table = ChangeTypeTable::from_rows(rows()).unwrap();
        assert_eq!(table.id_of(ChangeType::Deleted), 30);
        assert_eq!(table.kind_of(40).unwrap(), ChangeType::Renamed);
        assert!(table.kind_of(50).is_err());
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        let mut rows = rows();
        rows.pop();
        let err = ChangeTypeTable::from_rows(rows).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidData("missing change type"));
    }

    #[test]
    fn test_unknown_and_duplicate_kinds_are_rejected() {
        let mut unknown = rows();
        unknown.push((50, "copied".to_string()));
        assert_eq!(*ChangeTypeTable::from_rows(unknown).unwrap_err(), ErrorKind::InvalidData("unknown change type"));
        let mut duplicate = rows();
        duplicate.push((11, "created".to_string()));
        assert_eq!(*ChangeTypeTable::from_rows(duplicate).unwrap_err(), ErrorKind::InvalidData("duplicate change type"));
    }
}
