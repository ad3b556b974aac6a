//! The `notes` primary store and the `note_id`/`note_kind`/`note_author`/
//! `note_created` indices maintained alongside it (§3.4, §3.5, §4.4).

use nostrdb_core::keys::{IdTsKey, U64TsKey};
use nostrdb_core::note::Note;
use redb::{ReadTransaction, ReadableTable, WriteTransaction};

use crate::schema::{self, IdTs, U64Ts};
use crate::{tags, Result};

/// `note_key := last_key(notes) + 1` (§4.4 step 2).
pub fn next_note_key(wx: &WriteTransaction) -> Result<u64> {
    let table = wx.open_table(schema::NOTES)?;
    let last = table.last()?.map(|(k, _)| k.value());
    Ok(last.unwrap_or(0) + 1)
}

/// True if `note_id_index` has an entry for `id` at any timestamp
/// (§4.4 step 1's dedup probe).
pub fn id_exists<T>(table: &T, id: &[u8; 32]) -> Result<bool>
where
    T: ReadableTable<IdTs, u64>,
{
    Ok(id_range(table, id)?.next().is_some())
}

fn id_range<'a, T>(
    table: &'a T,
    id: &[u8; 32],
) -> Result<redb::Range<'a, IdTs, u64>>
where
    T: ReadableTable<IdTs, u64>,
{
    let low = IdTs(IdTsKey { id: *id, timestamp: 0 });
    let high = IdTs(IdTsKey { id: *id, timestamp: u64::MAX });
    Ok(table.range(low..=high)?)
}

/// The per-note write sequence (§4.4 steps 1-6, plus the `note_author`/
/// `note_created`/`note_tag` indices this expansion adds). Returns `None`
/// without writing anything if `id` is already present (dedup).
pub fn write_note(wx: &WriteTransaction, note: &Note<'_>) -> Result<Option<u64>> {
    {
        let note_id = wx.open_table(schema::NOTE_ID)?;
        if id_exists(&note_id, note.id())? {
            return Ok(None);
        }
    }

    let note_key = next_note_key(wx)?;

    {
        let mut notes = wx.open_table(schema::NOTES)?;
        notes.insert(note_key, note.as_bytes())?;
    }
    {
        let mut note_id = wx.open_table(schema::NOTE_ID)?;
        note_id.insert(
            IdTs(IdTsKey {
                id: *note.id(),
                timestamp: note.created_at(),
            }),
            note_key,
        )?;
    }
    {
        let mut note_kind = wx.open_table(schema::NOTE_KIND)?;
        note_kind.insert(
            U64Ts(U64TsKey {
                value: note.kind() as u64,
                timestamp: note.created_at(),
            }),
            note_key,
        )?;
    }
    write_added_indices(wx, note, note_key)?;
    tags::write_note_tags(wx, note, note_key)?;

    Ok(Some(note_key))
}

/// Just the `note_author`/`note_created` indices this expansion adds —
/// factored out so migration 4's rebuild can populate them from the
/// existing `notes` store without re-running the dedup probe.
pub(crate) fn write_added_indices(wx: &WriteTransaction, note: &Note<'_>, note_key: u64) -> Result<()> {
    {
        let mut note_author = wx.open_table(schema::NOTE_AUTHOR)?;
        note_author.insert(
            IdTs(IdTsKey {
                id: *note.pubkey(),
                timestamp: note.created_at(),
            }),
            note_key,
        )?;
    }
    {
        let mut note_created = wx.open_table(schema::NOTE_CREATED)?;
        note_created.insert(
            U64Ts(U64TsKey {
                value: note.created_at(),
                timestamp: note_key,
            }),
            note_key,
        )?;
    }
    Ok(())
}

pub fn get_by_key(rx: &ReadTransaction, note_key: u64) -> Result<Option<Vec<u8>>> {
    let table = rx.open_table(schema::NOTES)?;
    Ok(table.get(note_key)?.map(|v| v.value().to_vec()))
}

/// Looks up a note by its 32-byte id via `note_id_index` (§6.2's
/// `get_note_by_id`). Ids are unique by construction (write-time dedup),
/// so at most one entry can match.
pub fn get_by_id(rx: &ReadTransaction, id: &[u8; 32]) -> Result<Option<(u64, Vec<u8>)>> {
    let note_id = rx.open_table(schema::NOTE_ID)?;
    let Some(entry) = id_range(&note_id, id)?.next() else {
        return Ok(None);
    };
    let (_, value) = entry?;
    let note_key = value.value();
    drop(note_id);
    Ok(get_by_key(rx, note_key)?.map(|bytes| (note_key, bytes)))
}
