//! The `note_blocks` cache (§3.6): computed eagerly at write time for
//! kinds {1, 30023} (§4.4 step 5), lazily on first read otherwise and
//! written back (`get_blocks_by_key`, §6.2).

use nostrdb_core::blocks::{ContentBlockParser, DefaultBlockParser, NoteBlocks};
use nostrdb_core::note::Note;
use redb::{Database, ReadTransaction, ReadableTable, WriteTransaction};

use crate::schema;
use crate::{Error, Result};

const EAGER_KINDS: [u32; 2] = [1, 30023];

/// §4.4 step 5's eager parse, run inside the same write transaction as
/// the rest of the per-note write sequence.
pub fn write_eager(wx: &WriteTransaction, note: &Note<'_>, note_key: u64) -> Result<()> {
    if !EAGER_KINDS.contains(&note.kind()) {
        return Ok(());
    }
    let blocks = DefaultBlockParser.parse(&note.content());
    store(wx, note_key, &blocks)
}

/// `WRITE_BLOCKS` (§4.4): parses `content` now and stores the result,
/// independent of the eager kind gate — used when a caller already has
/// content in hand and wants `note_blocks` populated without waiting for
/// a lazy read.
pub fn write_from_content(wx: &WriteTransaction, note_key: u64, content: &str) -> Result<()> {
    let blocks = DefaultBlockParser.parse(content);
    store(wx, note_key, &blocks)
}

fn store(wx: &WriteTransaction, note_key: u64, blocks: &NoteBlocks) -> Result<()> {
    let bytes = bincode::serialize(blocks).expect("NoteBlocks always serializes");
    let mut table = wx.open_table(schema::NOTE_BLOCKS)?;
    table.insert(note_key, bytes.as_slice())?;
    Ok(())
}

fn read(rx: &ReadTransaction, note_key: u64) -> Result<Option<NoteBlocks>> {
    let table = rx.open_table(schema::NOTE_BLOCKS)?;
    let Some(value) = table.get(note_key)? else {
        return Ok(None);
    };
    let blocks =
        bincode::deserialize(value.value()).map_err(|_| Error::CorruptRecord { table: "note_blocks" })?;
    Ok(Some(blocks))
}

/// `get_blocks_by_key` (§6.2): returns the cached blocks for `note_key`,
/// or parses `content` now and writes the result back for next time.
pub fn get_or_compute(db: &Database, note_key: u64, content: &str) -> Result<NoteBlocks> {
    {
        let rx = db.begin_read()?;
        if let Some(cached) = read(&rx, note_key)? {
            return Ok(cached);
        }
    }
    let blocks = DefaultBlockParser.parse(content);
    let wx = db.begin_write()?;
    store(&wx, note_key, &blocks)?;
    wx.commit()?;
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostrdb_core::blocks::Block;
    use nostrdb_core::builder::NoteBuilder;

    fn build(kind: u32, content: &str) -> Vec<u8> {
        let mut b = NoteBuilder::new();
        b.set_id([1u8; 32]).set_pubkey([2u8; 32]).set_sig([0u8; 64]).set_kind(kind).set_created_at(1);
        b.set_content(content.as_bytes()).unwrap();
        let mut buf = vec![0u8; 4096];
        let size = b.finalize(&mut buf, None).unwrap();
        buf.truncate(size);
        buf
    }

    #[test]
    fn kind_1_is_computed_eagerly() {
        let db = crate::in_memory().unwrap();
        let bytes = build(1, "hello #world");
        let note = Note::from_bytes(&bytes).unwrap();
        let wx = db.begin_write().unwrap();
        write_eager(&wx, &note, 7).unwrap();
        wx.commit().unwrap();

        let rx = db.begin_read().unwrap();
        let cached = read(&rx, 7).unwrap().unwrap();
        assert_eq!(cached.blocks, vec![Block::Text("hello".into()), Block::Hashtag("world".into())]);
    }

    #[test]
    fn other_kinds_are_not_computed_eagerly() {
        let db = crate::in_memory().unwrap();
        let bytes = build(6, "hello #world");
        let note = Note::from_bytes(&bytes).unwrap();
        let wx = db.begin_write().unwrap();
        write_eager(&wx, &note, 7).unwrap();
        wx.commit().unwrap();

        let rx = db.begin_read().unwrap();
        assert!(read(&rx, 7).unwrap().is_none());
    }

    #[test]
    fn lazy_read_computes_and_caches() {
        let db = crate::in_memory().unwrap();
        let blocks = get_or_compute(&db, 99, "just text").unwrap();
        assert_eq!(blocks.blocks, vec![Block::Text("just text".into())]);

        let rx = db.begin_read().unwrap();
        assert!(read(&rx, 99).unwrap().is_some());
    }
}
