//! `Note` — a read-only view over the packed-note byte layout from §3.1,
//! and the `Tags`/`Tag` views over the variable-length tag table from §3.3.
//!
//! These types never copy the underlying buffer; they borrow it for as long
//! as the view lives. Writing a note goes through [`crate::builder::NoteBuilder`]
//! instead.

use std::borrow::Cow;

use crate::packed::PackedStrVariant;
use crate::{Error, Id32, PackedStr, Sig64, Timestamp, NOTE_VERSION};

/// Byte size of the fixed note header, ending right before the `Tags` table.
pub const HEADER_SIZE: usize = 1 // version
    + 3 // padding
    + 32 // id
    + 32 // pubkey
    + 64 // sig
    + 8 // created_at
    + 4 // kind
    + 4 // content_length
    + 4 // content (PackedStr)
    + 4; // strings_offset

const OFF_ID: usize = 4;
const OFF_PUBKEY: usize = OFF_ID + 32;
const OFF_SIG: usize = OFF_PUBKEY + 32;
const OFF_CREATED_AT: usize = OFF_SIG + 64;
const OFF_KIND: usize = OFF_CREATED_AT + 8;
const OFF_CONTENT_LEN: usize = OFF_KIND + 4;
const OFF_CONTENT: usize = OFF_CONTENT_LEN + 4;
const OFF_STRINGS: usize = OFF_CONTENT + 4;

/// A read-only view over a packed note's bytes.
#[derive(Debug, Clone, Copy)]
pub struct Note<'a> {
    buf: &'a [u8],
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(buf[at..at + 4].try_into().unwrap())
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(buf[at..at + 8].try_into().unwrap())
}

fn read_array32(buf: &[u8], at: usize) -> &Id32 {
    <&Id32>::try_from(&buf[at..at + 32]).unwrap()
}

impl<'a> Note<'a> {
    /// Interpret `buf` as a packed note. Fails if the buffer is too short or
    /// the version byte is not the one this crate understands.
    pub fn from_bytes(buf: &'a [u8]) -> Result<Self, Error> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::WrongShape("note"));
        }
        let note = Note { buf };
        if note.version() != NOTE_VERSION {
            return Err(Error::WrongShape("note.version"));
        }
        Ok(note)
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.buf
    }

    pub fn version(&self) -> u8 {
        self.buf[0]
    }

    pub fn id(&self) -> &'a Id32 {
        read_array32(self.buf, OFF_ID)
    }

    pub fn pubkey(&self) -> &'a Id32 {
        read_array32(self.buf, OFF_PUBKEY)
    }

    pub fn sig(&self) -> &'a Sig64 {
        <&Sig64>::try_from(&self.buf[OFF_SIG..OFF_SIG + 64]).unwrap()
    }

    pub fn created_at(&self) -> Timestamp {
        read_u64(self.buf, OFF_CREATED_AT)
    }

    pub fn kind(&self) -> u32 {
        read_u32(self.buf, OFF_KIND)
    }

    pub fn content_length(&self) -> u32 {
        read_u32(self.buf, OFF_CONTENT_LEN)
    }

    fn content_packed(&self) -> PackedStr {
        PackedStr::from_bytes(self.buf[OFF_CONTENT..OFF_CONTENT + 4].try_into().unwrap())
    }

    fn strings_offset(&self) -> u32 {
        read_u32(self.buf, OFF_STRINGS)
    }

    /// The note's content. Content is never stored as a packed-id (§3.5), so
    /// this is always a plain string slice borrowed from the strings arena
    /// or, for very short content, the inline form.
    pub fn content(&self) -> Cow<'a, str> {
        self.render_packed(self.content_packed())
    }

    pub fn tags(&self) -> Tags<'a> {
        let base = HEADER_SIZE;
        let count = u16::from_le_bytes(self.buf[base + 2..base + 4].try_into().unwrap());
        Tags {
            buf: self.buf,
            base: base + 4,
            count,
        }
    }

    /// Resolve a NUL-terminated string at `offset` bytes into the strings
    /// arena.
    fn resolve_offset_str(&self, offset: u32) -> &'a str {
        let start = self.strings_offset() as usize + offset as usize;
        let bytes = &self.buf[start..];
        let nul = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..nul]).unwrap_or("")
    }

    /// Resolve a raw 32-byte id at `offset` bytes into the strings arena.
    fn resolve_packed_id(&self, offset: u32) -> &'a Id32 {
        let start = self.strings_offset() as usize + offset as usize;
        read_array32(self.buf, start)
    }

    /// Render a [`PackedStr`] the way it should appear in output: inline and
    /// offset-string variants verbatim, packed-id variants as 64-char
    /// lowercase hex (§3.2).
    pub fn render_packed(&self, p: PackedStr) -> Cow<'a, str> {
        match p.variant() {
            PackedStrVariant::Inline(bytes) => {
                let nul = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Cow::Owned(String::from_utf8_lossy(&bytes[..nul]).into_owned())
            }
            PackedStrVariant::OffsetStr(off) => Cow::Borrowed(self.resolve_offset_str(off)),
            PackedStrVariant::PackedId(off) => Cow::Owned(hex::encode(self.resolve_packed_id(off))),
        }
    }

    /// Resolve a tag element as a raw id, if it was interned as a packed-id
    /// (i.e. it was a 64-char lowercase hex string at build time).
    pub fn packed_str_as_id(&self, p: PackedStr) -> Option<&'a Id32> {
        match p.variant() {
            PackedStrVariant::PackedId(off) => Some(self.resolve_packed_id(off)),
            _ => None,
        }
    }
}

/// A view over the variable-length tag table (§3.3).
#[derive(Debug, Clone, Copy)]
pub struct Tags<'a> {
    buf: &'a [u8],
    base: usize,
    count: u16,
}

impl<'a> Tags<'a> {
    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> TagsIter<'a> {
        TagsIter {
            buf: self.buf,
            next: self.base,
            remaining: self.count,
        }
    }
}

impl<'a> IntoIterator for Tags<'a> {
    type Item = Tag<'a>;
    type IntoIter = TagsIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct TagsIter<'a> {
    buf: &'a [u8],
    next: usize,
    remaining: u16,
}

impl<'a> Iterator for TagsIter<'a> {
    type Item = Tag<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let count = u16::from_le_bytes(self.buf[self.next..self.next + 2].try_into().unwrap());
        let tag = Tag {
            buf: self.buf,
            base: self.next + 2,
            count,
        };
        self.next += 2 + (count as usize) * 4;
        self.remaining -= 1;
        Some(tag)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining as usize, Some(self.remaining as usize))
    }
}

/// A single tag: an array of [`PackedStr`] elements, whose first element is
/// conventionally a short label (`'e'`, `'p'`, `'t'`, `'q'`, ...).
#[derive(Debug, Clone, Copy)]
pub struct Tag<'a> {
    buf: &'a [u8],
    base: usize,
    count: u16,
}

impl<'a> Tag<'a> {
    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn get(&self, index: u16) -> Option<PackedStr> {
        if index >= self.count {
            return None;
        }
        let at = self.base + (index as usize) * 4;
        Some(PackedStr::from_bytes(self.buf[at..at + 4].try_into().unwrap()))
    }

    pub fn iter(&self) -> impl Iterator<Item = PackedStr> + 'a {
        let buf = self.buf;
        let base = self.base;
        (0..self.count).map(move |i| {
            let at = base + (i as usize) * 4;
            PackedStr::from_bytes(buf[at..at + 4].try_into().unwrap())
        })
    }

    /// True if the first element of this tag, rendered as a string, equals
    /// the single character `c`. Used for the conventional `'e'`/`'p'`/`'t'`/
    /// `'q'` first-element labels.
    pub fn matches_label(&self, note: &Note<'a>, c: char) -> bool {
        match self.get(0) {
            Some(p) => note.render_packed(p).as_ref() == c.to_string(),
            None => false,
        }
    }
}
