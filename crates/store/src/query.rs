//! Cursor-walk primitives over the index tables (§4.5). Each function
//! here implements one plan's index walk and returns candidate
//! `note_key`s in the index's natural (descending `created_at`) order;
//! fetching the note bytes, applying the rest of a [`nostrdb_core::filter::Filter`],
//! and the final cross-filter `(-created_at, id)` sort happen one layer
//! up, in the root crate's query executor.

use nostrdb_core::keys::{IdTsKey, U64TsKey};
use redb::{ReadTransaction, ReadableTable};

use crate::schema::{self, IdTs, U64Ts};
use crate::{tags, Result};

/// IDS plan: the note for `id`, if its `created_at` is `<= until`. Ids
/// are unique by construction (write-time dedup), so at most one
/// candidate can exist.
pub fn scan_id(rx: &ReadTransaction, id: &[u8; 32], until: Option<u64>) -> Result<Option<u64>> {
    let table = rx.open_table(schema::NOTE_ID)?;
    let low = IdTs(IdTsKey { id: *id, timestamp: 0 });
    let high = IdTs(IdTsKey {
        id: *id,
        timestamp: until.unwrap_or(u64::MAX),
    });
    let mut range = table.range(low..=high)?;
    Ok(range.next_back().transpose()?.map(|(_, v)| v.value()))
}

/// KINDS plan: note_keys for `kind`, `created_at <= until`, descending,
/// capped at `limit`.
pub fn scan_kind(rx: &ReadTransaction, kind: u64, until: Option<u64>, limit: usize) -> Result<Vec<u64>> {
    let table = rx.open_table(schema::NOTE_KIND)?;
    let low = U64Ts(U64TsKey { value: kind, timestamp: 0 });
    let high = U64Ts(U64TsKey {
        value: kind,
        timestamp: until.unwrap_or(u64::MAX),
    });
    let mut out = Vec::new();
    for entry in table.range(low..=high)?.rev() {
        let (_, v) = entry?;
        out.push(v.value());
        if out.len() >= limit {
            break;
        }
    }
    Ok(out)
}

/// AUTHORS plan: note_keys by `pubkey`, `created_at <= until`, descending.
pub fn scan_author(
    rx: &ReadTransaction,
    pubkey: &[u8; 32],
    until: Option<u64>,
    limit: usize,
) -> Result<Vec<u64>> {
    let table = rx.open_table(schema::NOTE_AUTHOR)?;
    let low = IdTs(IdTsKey { id: *pubkey, timestamp: 0 });
    let high = IdTs(IdTsKey {
        id: *pubkey,
        timestamp: until.unwrap_or(u64::MAX),
    });
    let mut out = Vec::new();
    for entry in table.range(low..=high)?.rev() {
        let (_, v) = entry?;
        out.push(v.value());
        if out.len() >= limit {
            break;
        }
    }
    Ok(out)
}

/// CREATED plan: every note_key in `created_at` descending order,
/// bounded by `until`.
pub fn scan_created(rx: &ReadTransaction, until: Option<u64>, limit: usize) -> Result<Vec<u64>> {
    let table = rx.open_table(schema::NOTE_CREATED)?;
    let low = U64Ts(U64TsKey { value: 0, timestamp: 0 });
    let high = U64Ts(U64TsKey {
        value: until.unwrap_or(u64::MAX),
        timestamp: u64::MAX,
    });
    let mut out = Vec::new();
    for entry in table.range(low..=high)?.rev() {
        let (_, v) = entry?;
        out.push(v.value());
        if out.len() >= limit {
            break;
        }
    }
    Ok(out)
}

/// TAGS plan: note_keys for `(label, value)`, `created_at <= until`,
/// descending, capped at `limit`.
pub fn scan_tag(
    rx: &ReadTransaction,
    label: u8,
    value: &[u8],
    until: Option<u64>,
    limit: usize,
) -> Result<Vec<u64>> {
    let mut entries = tags::scan(rx, label, value)?;
    entries.sort_unstable_by(|a, b| b.0.cmp(&a.0));
    let until = until.unwrap_or(u64::MAX);
    Ok(entries
        .into_iter()
        .filter(|&(created_at, _)| created_at <= until)
        .take(limit)
        .map(|(_, note_key)| note_key)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostrdb_core::builder::NoteBuilder;
    use nostrdb_core::note::Note;

    fn build(id: u8, kind: u32, created_at: u64) -> Vec<u8> {
        let mut b = NoteBuilder::new();
        b.set_id([id; 32])
            .set_pubkey([id; 32])
            .set_sig([0u8; 64])
            .set_kind(kind)
            .set_created_at(created_at);
        b.set_content(b"x").unwrap();
        let mut buf = vec![0u8; 4096];
        let size = b.finalize(&mut buf, None).unwrap();
        buf.truncate(size);
        buf
    }

    #[test]
    fn kinds_plan_walks_newest_first() {
        let db = crate::in_memory().unwrap();
        let notes = [build(1, 1337, 100), build(2, 1337, 300), build(3, 1, 200)];
        let wx = db.begin_write().unwrap();
        for bytes in &notes {
            let note = Note::from_bytes(bytes).unwrap();
            crate::notes::write_note(&wx, &note).unwrap();
        }
        wx.commit().unwrap();

        let rx = db.begin_read().unwrap();
        let keys = scan_kind(&rx, 1337, None, 10).unwrap();
        assert_eq!(keys, vec![2, 1]); // note_key 2 (created_at 300) before note_key 1 (100)
    }

    #[test]
    fn ids_plan_respects_until() {
        let db = crate::in_memory().unwrap();
        let bytes = build(9, 1, 500);
        let id = [9u8; 32];
        let wx = db.begin_write().unwrap();
        let note = Note::from_bytes(&bytes).unwrap();
        crate::notes::write_note(&wx, &note).unwrap();
        wx.commit().unwrap();

        let rx = db.begin_read().unwrap();
        assert_eq!(scan_id(&rx, &id, Some(1000)).unwrap(), Some(1));
        assert_eq!(scan_id(&rx, &id, Some(100)).unwrap(), None);
    }
}
