//! `note_tag` index maintenance (§3.3), added for the TAGS plan (§4.5).
//! Only the four conventional single-character labels are indexed: `e`,
//! `p`, `t`, `q`; everything else a note tags with is left unindexed and
//! only reachable by scanning the note itself.

use nostrdb_core::note::Note;
use redb::{ReadTransaction, ReadableTable, WriteTransaction};

use crate::schema;
use crate::Result;

const INDEXED_LABELS: [u8; 4] = [b'e', b'p', b't', b'q'];

/// Writes one `note_tag` entry per indexed tag on `note` (§4.4's write
/// sequence extended for the TAGS plan).
pub fn write_note_tags(wx: &WriteTransaction, note: &Note<'_>, note_key: u64) -> Result<()> {
    let mut table = wx.open_table(schema::NOTE_TAG)?;
    for tag in note.tags() {
        if tag.count() < 2 {
            continue;
        }
        let label = note.render_packed(tag.get(0).unwrap());
        if label.len() != 1 || !INDEXED_LABELS.contains(&label.as_bytes()[0]) {
            continue;
        }
        let label_byte = label.as_bytes()[0];
        let value_bytes = note.render_packed(tag.get(1).unwrap()).into_owned().into_bytes();
        let key = schema::encode_tag_key(label_byte, &value_bytes, note.created_at(), note_key);
        table.insert(key.as_slice(), note_key)?;
    }
    Ok(())
}

/// All `note_tag` entries for `(label, value)`, as `(created_at,
/// note_key)` pairs in ascending `created_at` order. The TAGS plan
/// (§4.5) reverses this for the DESC walk it needs.
pub fn scan(rx: &ReadTransaction, label: u8, value: &[u8]) -> Result<Vec<(u64, u64)>> {
    let table = rx.open_table(schema::NOTE_TAG)?;
    let prefix = schema::tag_key_prefix(label, value);
    let mut out = Vec::new();
    for entry in table.range(prefix.as_slice()..)? {
        let (k, v) = entry?;
        let key_bytes = k.value();
        if !key_bytes.starts_with(prefix.as_slice()) {
            break;
        }
        let tail = &key_bytes[key_bytes.len() - 16..];
        let created_at = u64::from_be_bytes(tail[..8].try_into().unwrap());
        out.push((created_at, v.value()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostrdb_core::builder::NoteBuilder;
    use nostrdb_core::note::Note;

    fn build_note_with_e_tag(id: u8, liked: [u8; 32], created_at: u64) -> Vec<u8> {
        let mut b = NoteBuilder::new();
        b.set_id([id; 32])
            .set_pubkey([1u8; 32])
            .set_sig([0u8; 64])
            .set_kind(1)
            .set_created_at(created_at);
        b.set_content(b"hi").unwrap();
        b.begin_tag();
        b.push_tag_element(b"e").unwrap();
        b.push_tag_element(&hex::encode(liked).into_bytes()).unwrap();
        let mut buf = vec![0u8; 4096];
        let size = b.finalize(&mut buf, None).unwrap();
        buf.truncate(size);
        buf
    }

    #[test]
    fn write_then_scan_finds_the_tagged_note() {
        let db = crate::in_memory().unwrap();
        let liked = [9u8; 32];
        let bytes = build_note_with_e_tag(1, liked, 100);
        let note = Note::from_bytes(&bytes).unwrap();
        {
            let wx = db.begin_write().unwrap();
            write_note_tags(&wx, &note, 42).unwrap();
            wx.commit().unwrap();
        }
        let rx = db.begin_read().unwrap();
        let found = scan(&rx, b'e', hex::encode(liked).as_bytes()).unwrap();
        assert_eq!(found, vec![(100, 42)]);
    }

    #[test]
    fn unindexed_labels_are_skipped() {
        let db = crate::in_memory().unwrap();
        let mut b = NoteBuilder::new();
        b.set_kind(1).set_created_at(1);
        b.set_content(b"x").unwrap();
        b.begin_tag();
        b.push_tag_element(b"nonsense").unwrap();
        b.push_tag_element(b"value").unwrap();
        let mut buf = vec![0u8; 4096];
        let size = b.finalize(&mut buf, None).unwrap();
        buf.truncate(size);
        let note = Note::from_bytes(&buf).unwrap();

        let wx = db.begin_write().unwrap();
        write_note_tags(&wx, &note, 1).unwrap();
        wx.commit().unwrap();

        let rx = db.begin_read().unwrap();
        assert!(scan(&rx, b'n', b"value").unwrap().is_empty());
    }
}
