//! The packed-note codec's write side (§4.1).
//!
//! Per the design notes, this builds tags up in a typed, owned structure and
//! serializes the final byte layout once at [`NoteBuilder::finalize`], rather
//! than juggling raw cursors into a single buffer by hand. Finalizing into a
//! buffer that is too small aborts (returns [`Error::BufferOverflow`]) and
//! the caller is expected to retry with a larger buffer; nothing is ever
//! partially written on overflow.

use std::collections::HashMap;

use crate::note::HEADER_SIZE;
use crate::sign::{canonical_commitment, sha256, Keypair};
use crate::{Error, Id32, PackedStr, Sig64, Timestamp, NOTE_ALIGNMENT, NOTE_VERSION};

/// The 24-bit offset space a [`PackedStr`] can address into the strings
/// arena.
const MAX_ARENA_OFFSET: usize = 0x00FF_FFFF;

struct Interner {
    arena: Vec<u8>,
    dedup: HashMap<Vec<u8>, u32>,
}

impl Interner {
    fn new() -> Self {
        Interner {
            arena: Vec::new(),
            dedup: HashMap::new(),
        }
    }

    /// Implements §4.1's `push_tag_element` algorithm: inline for ≤2 bytes,
    /// packed-id for 64-char lowercase hex (when `hex_id_check` is set),
    /// otherwise dedup-or-append into the strings arena.
    fn intern(&mut self, bytes: &[u8], hex_id_check: bool) -> Result<PackedStr, Error> {
        if bytes.len() <= 2 {
            return Ok(PackedStr::inline(bytes));
        }

        if hex_id_check && bytes.len() == 64 && is_lowercase_hex(bytes) {
            if let Some(id) = decode_hex_32(bytes) {
                let offset = self.arena.len();
                if offset > MAX_ARENA_OFFSET {
                    return Err(Error::BufferOverflow);
                }
                self.arena.extend_from_slice(&id);
                return Ok(PackedStr::packed_id(offset as u32));
            }
        }

        if let Some(&offset) = self.dedup.get(bytes) {
            return Ok(PackedStr::offset_str(offset));
        }

        let offset = self.arena.len();
        if offset > MAX_ARENA_OFFSET {
            return Err(Error::BufferOverflow);
        }
        self.arena.extend_from_slice(bytes);
        self.arena.push(0);
        self.dedup.insert(bytes.to_vec(), offset as u32);
        Ok(PackedStr::offset_str(offset as u32))
    }
}

fn is_lowercase_hex(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
}

fn decode_hex_32(bytes: &[u8]) -> Option<[u8; 32]> {
    let mut out = [0u8; 32];
    hex::decode_to_slice(bytes, &mut out).ok()?;
    Some(out)
}

/// A builder for one packed note. Create with [`NoteBuilder::new`], call the
/// `set_*`/`begin_tag`/`push_tag_element` methods in any order that respects
/// "tags after content", then [`NoteBuilder::finalize`].
pub struct NoteBuilder {
    id: Id32,
    pubkey: Id32,
    sig: Sig64,
    kind: u32,
    created_at: Timestamp,
    content_raw: Vec<u8>,
    content_packed: PackedStr,
    tags_raw: Vec<Vec<Vec<u8>>>,
    tags_packed: Vec<Vec<PackedStr>>,
    current_tag: Option<usize>,
    interner: Interner,
}

impl Default for NoteBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NoteBuilder {
    pub fn new() -> Self {
        NoteBuilder {
            id: [0u8; 32],
            pubkey: [0u8; 32],
            sig: [0u8; 64],
            kind: 0,
            created_at: 0,
            content_raw: Vec::new(),
            content_packed: PackedStr::inline(b""),
            tags_raw: Vec::new(),
            tags_packed: Vec::new(),
            current_tag: None,
            interner: Interner::new(),
        }
    }

    pub fn set_id(&mut self, id: Id32) -> &mut Self {
        self.id = id;
        self
    }

    pub fn set_pubkey(&mut self, pubkey: Id32) -> &mut Self {
        self.pubkey = pubkey;
        self
    }

    pub fn set_sig(&mut self, sig: Sig64) -> &mut Self {
        self.sig = sig;
        self
    }

    pub fn set_kind(&mut self, kind: u32) -> &mut Self {
        self.kind = kind;
        self
    }

    pub fn set_created_at(&mut self, created_at: Timestamp) -> &mut Self {
        self.created_at = created_at;
        self
    }

    /// Content strings take the same interning path as tag elements but with
    /// the 64-char-hex-to-packed-id check disabled (§3.5: content is never
    /// stored as a packed id).
    pub fn set_content(&mut self, content: &[u8]) -> Result<&mut Self, Error> {
        self.content_raw = content.to_vec();
        self.content_packed = self.interner.intern(content, false)?;
        Ok(self)
    }

    pub fn begin_tag(&mut self) -> &mut Self {
        self.tags_raw.push(Vec::new());
        self.tags_packed.push(Vec::new());
        self.current_tag = Some(self.tags_raw.len() - 1);
        self
    }

    pub fn push_tag_element(&mut self, bytes: &[u8]) -> Result<&mut Self, Error> {
        let idx = self.current_tag.ok_or(Error::WrongShape("tag"))?;
        let packed = self.interner.intern(bytes, true)?;
        self.tags_raw[idx].push(bytes.to_vec());
        self.tags_packed[idx].push(packed);
        Ok(self)
    }

    /// Compute the final byte size this note will occupy once padded to
    /// 8 bytes, without writing anything.
    fn final_size(&self) -> usize {
        let tags_header = 4usize; // padding:u16 + count:u16
        let tag_bytes: usize = self
            .tags_packed
            .iter()
            .map(|t| 2 + t.len() * 4) // count:u16 + PackedStr[count]
            .sum();
        let total = HEADER_SIZE + tags_header + tag_bytes + self.interner.arena.len();
        total.div_ceil(NOTE_ALIGNMENT) * NOTE_ALIGNMENT
    }

    /// Finalize the note into `buf`. If `signer` is supplied, the canonical
    /// commitment is hashed with SHA-256 to set `id`, and signed to set
    /// `sig`, overriding anything set via [`Self::set_id`]/[`Self::set_sig`].
    /// Returns the total record size, or [`Error::BufferOverflow`] if `buf`
    /// is too small — the caller should retry with a larger buffer.
    pub fn finalize(&mut self, buf: &mut [u8], signer: Option<&Keypair>) -> Result<usize, Error> {
        if let Some(signer) = signer {
            self.pubkey = signer.public_key_xonly();
            let commitment = canonical_commitment(
                &self.pubkey,
                self.created_at,
                self.kind,
                &self.tags_raw,
                &self.content_raw,
            );
            self.id = sha256(&commitment);
            self.sig = signer.sign(&self.id);
        }

        let total = self.final_size();
        if buf.len() < total {
            return Err(Error::BufferOverflow);
        }
        buf[..total].fill(0);

        buf[0] = NOTE_VERSION;
        buf[4..36].copy_from_slice(&self.id);
        buf[36..68].copy_from_slice(&self.pubkey);
        buf[68..132].copy_from_slice(&self.sig);
        buf[132..140].copy_from_slice(&self.created_at.to_le_bytes());
        buf[140..144].copy_from_slice(&self.kind.to_le_bytes());
        buf[144..148].copy_from_slice(&(self.content_raw.len() as u32).to_le_bytes());
        buf[148..152].copy_from_slice(&self.content_packed.as_bytes());

        let tags_base = HEADER_SIZE;
        let mut cursor = tags_base;
        // Tags header: padding:u16 = 0, count:u16.
        buf[cursor..cursor + 2].copy_from_slice(&0u16.to_le_bytes());
        buf[cursor + 2..cursor + 4]
            .copy_from_slice(&(self.tags_packed.len() as u16).to_le_bytes());
        cursor += 4;

        for tag in &self.tags_packed {
            buf[cursor..cursor + 2].copy_from_slice(&(tag.len() as u16).to_le_bytes());
            cursor += 2;
            for elem in tag {
                buf[cursor..cursor + 4].copy_from_slice(&elem.as_bytes());
                cursor += 4;
            }
        }

        let strings_offset = cursor as u32;
        buf[152..156].copy_from_slice(&strings_offset.to_le_bytes());
        buf[cursor..cursor + self.interner.arena.len()].copy_from_slice(&self.interner.arena);

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::note::Note;

    #[test]
    fn builds_and_reads_back_a_simple_note() {
        let mut b = NoteBuilder::new();
        b.set_id([1u8; 32])
            .set_pubkey([2u8; 32])
            .set_sig([3u8; 64])
            .set_kind(1)
            .set_created_at(100);
        b.set_content(b"hello").unwrap();
        b.begin_tag();
        b.push_tag_element(b"p").unwrap();
        b.push_tag_element(&hex::encode([1u8; 32]).into_bytes())
            .unwrap();
        b.begin_tag();
        b.push_tag_element(b"word").unwrap();
        b.push_tag_element(b"words").unwrap();
        b.push_tag_element(b"w").unwrap();

        let mut buf = vec![0u8; 4096];
        let size = b.finalize(&mut buf, None).unwrap();
        assert_eq!(size % 8, 0);

        let note = Note::from_bytes(&buf[..size]).unwrap();
        assert_eq!(note.content(), "hello");
        assert_eq!(note.kind(), 1);
        assert_eq!(note.created_at(), 100);
        let tags: Vec<_> = note.tags().iter().collect();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].count(), 2);
        assert_eq!(note.render_packed(tags[0].get(0).unwrap()), "p");
        assert!(tags[0].get(1).unwrap().is_packed_id());
        assert_eq!(tags[1].count(), 3);
    }

    #[test]
    fn dedup_reuses_arena_offsets() {
        let mut b = NoteBuilder::new();
        b.set_content(b"").unwrap();
        b.begin_tag();
        b.push_tag_element(b"repeatme").unwrap();
        b.begin_tag();
        b.push_tag_element(b"repeatme").unwrap();
        let first = b.tags_packed[0][0];
        let second = b.tags_packed[1][0];
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn signing_sets_id_and_sig() {
        let kp = Keypair::generate();
        let mut b = NoteBuilder::new();
        b.set_kind(1).set_created_at(1).set_content(b"x").unwrap();
        let mut buf = vec![0u8; 4096];
        let size = b.finalize(&mut buf, Some(&kp)).unwrap();
        let note = Note::from_bytes(&buf[..size]).unwrap();
        assert_eq!(*note.pubkey(), kp.public_key_xonly());
        assert_ne!(*note.id(), [0u8; 32]);
    }

    #[test]
    fn overflow_on_small_buffer() {
        let mut b = NoteBuilder::new();
        b.set_content(b"a fairly long piece of content to push past a tiny buffer")
            .unwrap();
        let mut buf = vec![0u8; 8];
        assert_eq!(b.finalize(&mut buf, None), Err(Error::BufferOverflow));
    }
}
