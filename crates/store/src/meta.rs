//! `ndb_meta` (schema version, §4.9, §6.4) and `note_meta` (the reaction
//! counter maintained as a side effect of ingest, §3.6).

use redb::{ReadTransaction, ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};

use crate::schema::{self, VERSION_KEY};
use crate::{Error, Result};

/// Reads the stored schema version, or `None` if `ndb_meta` has never been
/// written (a freshly created database).
pub fn read_version(rx: &ReadTransaction) -> Result<Option<u64>> {
    let table = rx.open_table(schema::NDB_META)?;
    let Some(value) = table.get(VERSION_KEY)? else {
        return Ok(None);
    };
    let bytes = value.value();
    if bytes.len() != 8 {
        return Err(Error::CorruptRecord { table: "ndb_meta" });
    }
    Ok(Some(u64::from_le_bytes(bytes.try_into().unwrap())))
}

/// `WRITE_DBMETA` (§4.4): sets the stored schema version, little-endian
/// u64 (§6.4).
pub fn write_version(wx: &WriteTransaction, version: u64) -> Result<()> {
    let mut table = wx.open_table(schema::NDB_META)?;
    table.insert(VERSION_KEY, version.to_le_bytes().as_slice())?;
    Ok(())
}

/// The reaction-count record kept under `note_meta[id]` (§3.6), keyed by
/// raw id rather than `note_key` so reactions can accumulate against an id
/// whose note has not yet been seen.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteMeta {
    pub reactions: u64,
}

pub fn read_note_meta(rx: &ReadTransaction, id: &[u8; 32]) -> Result<Option<NoteMeta>> {
    let table = rx.open_table(schema::NOTE_META)?;
    let Some(value) = table.get(id)? else {
        return Ok(None);
    };
    let meta: NoteMeta =
        bincode::deserialize(value.value()).map_err(|_| Error::CorruptRecord { table: "note_meta" })?;
    Ok(Some(meta))
}

/// Read-modify-write: increments the reaction counter on `liked_id` within
/// the write transaction (§3.6, §4.4 step 6).
pub fn increment_reactions(wx: &WriteTransaction, liked_id: &[u8; 32]) -> Result<u64> {
    let mut table = wx.open_table(schema::NOTE_META)?;
    let mut meta = match table.get(liked_id)? {
        Some(value) => bincode::deserialize(value.value())
            .map_err(|_| Error::CorruptRecord { table: "note_meta" })?,
        None => NoteMeta::default(),
    };
    meta.reactions += 1;
    let bytes = bincode::serialize(&meta).expect("NoteMeta always serializes");
    table.insert(liked_id, bytes.as_slice())?;
    Ok(meta.reactions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_roundtrips_through_a_write_then_read_txn() {
        let db = crate::in_memory().unwrap();
        {
            let wx = db.begin_write().unwrap();
            write_version(&wx, 3).unwrap();
            wx.commit().unwrap();
        }
        let rx = db.begin_read().unwrap();
        assert_eq!(read_version(&rx).unwrap(), Some(3));
    }

    #[test]
    fn reactions_accumulate_for_an_id_with_no_note_yet() {
        let db = crate::in_memory().unwrap();
        let id = [9u8; 32];
        {
            let wx = db.begin_write().unwrap();
            assert_eq!(increment_reactions(&wx, &id).unwrap(), 1);
            assert_eq!(increment_reactions(&wx, &id).unwrap(), 2);
            wx.commit().unwrap();
        }
        let rx = db.begin_read().unwrap();
        assert_eq!(read_note_meta(&rx, &id).unwrap().unwrap().reactions, 2);
    }
}
