//! Index key encodings (§3.4). Each type here encodes/decodes its byte
//! representation and exposes a `cmp_encoded` comparator; `nostrdb-store`
//! wires these into `redb::Key` impls so the on-disk ordering matches
//! exactly (§6.1's "set_comparator" becomes a typed-key ordering rather
//! than a registered function pointer).

use std::cmp::Ordering;

use crate::{Id32, Timestamp};

/// Clustered id + timestamp key, used for `note_id` and `profile_pubkey`.
/// Compared as `lex(id)` first, then numeric `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdTsKey {
    pub id: Id32,
    pub timestamp: Timestamp,
}

impl IdTsKey {
    pub const ENCODED_LEN: usize = 40;

    pub fn to_bytes(self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[..32].copy_from_slice(&self.id);
        out[32..].copy_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes[..32]);
        let timestamp = u64::from_be_bytes(bytes[32..40].try_into().unwrap());
        IdTsKey { id, timestamp }
    }

    pub fn cmp_encoded(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// `(u64, timestamp)` key, used for `note_kind` (`kind, created_at`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U64TsKey {
    pub value: u64,
    pub timestamp: Timestamp,
}

impl U64TsKey {
    pub const ENCODED_LEN: usize = 16;

    pub fn to_bytes(self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[..8].copy_from_slice(&self.value.to_be_bytes());
        out[8..].copy_from_slice(&self.timestamp.to_be_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let value = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
        let timestamp = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
        U64TsKey { value, timestamp }
    }

    pub fn cmp_encoded(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Profile-name search key: compared by `(search, timestamp)` where `search`
/// is the leading lowercase prefix of the candidate name, with `pubkey` as a
/// final tie-break so distinct profiles with the same name/timestamp don't
/// collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchKey {
    pub pubkey: Id32,
    pub timestamp: Timestamp,
    pub search: String,
}

impl SearchKey {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.search.len() + 1 + 8 + 32);
        out.extend_from_slice(self.search.as_bytes());
        out.push(0); // NUL terminator: ensures prefix strings sort before their extensions
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.pubkey);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let nul = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let search = String::from_utf8_lossy(&bytes[..nul]).into_owned();
        let rest = &bytes[nul + 1..];
        let timestamp = u64::from_be_bytes(rest[0..8].try_into().unwrap());
        let mut pubkey = [0u8; 32];
        pubkey.copy_from_slice(&rest[8..40]);
        SearchKey {
            pubkey,
            timestamp,
            search,
        }
    }

    pub fn cmp_encoded(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Lowercase, ASCII-folded prefix used for profile-name search (simple ASCII
/// lowercase; non-ASCII bytes pass through unchanged, matching the full-text
/// tokenizer's rule in §4.7).
pub fn search_prefix(name: &str) -> String {
    name.chars().map(ascii_lower_char).collect()
}

fn ascii_lower_char(c: char) -> char {
    if c.is_ascii() {
        c.to_ascii_lowercase()
    } else {
        c
    }
}

// --- varint (LEB128, unsigned) ---

pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        } else {
            out.push(byte | 0x80);
        }
    }
}

/// Returns `(value, bytes_consumed)`.
pub fn read_varint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate() {
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
    None
}

/// The full-text index key (§3.4, §4.7): varint-packed, variable length.
/// Comparison order is `(word_bytes lex asc, timestamp, note_key,
/// word_index)` — NOT the physical byte order of the encoding, which leads
/// with `note_key` so a match can be discarded without decoding the whole
/// key. `nostrdb-store`'s `redb::Key` impl for this type delegates to
/// [`TextKey::cmp_encoded`] rather than plain byte comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextKey {
    pub note_key: u64,
    pub word: Vec<u8>,
    pub timestamp: u64,
    pub word_index: u64,
}

/// Keys larger than this are silently skipped at write time (§4.7).
pub const TEXT_KEY_BUDGET: usize = 1024;

impl TextKey {
    /// Encode, padding the result to a multiple of 8 bytes. Returns `None`
    /// if the encoded (unpadded) key would exceed [`TEXT_KEY_BUDGET`].
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(32);
        write_varint(&mut out, self.note_key);
        write_varint(&mut out, self.word.len() as u64);
        out.extend_from_slice(&self.word);
        write_varint(&mut out, self.timestamp);
        write_varint(&mut out, self.word_index);
        if out.len() > TEXT_KEY_BUDGET {
            return None;
        }
        let padded = out.len().div_ceil(8) * 8;
        out.resize(padded, 0);
        Some(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (note_key, n1) = read_varint(bytes)?;
        let rest = &bytes[n1..];
        let (word_len, n2) = read_varint(rest)?;
        let rest = &rest[n2..];
        let word_len = word_len as usize;
        if rest.len() < word_len {
            return None;
        }
        let word = rest[..word_len].to_vec();
        let rest = &rest[word_len..];
        let (timestamp, n3) = read_varint(rest)?;
        let rest = &rest[n3..];
        let (word_index, _n4) = read_varint(rest)?;
        Some(TextKey {
            note_key,
            word,
            timestamp,
            word_index,
        })
    }

    /// Just the leading `note_key`, without decoding the rest of the key.
    pub fn peek_note_key(bytes: &[u8]) -> Option<u64> {
        Some(read_varint(bytes)?.0)
    }

    /// Just the word bytes, without decoding timestamp/word_index.
    pub fn peek_word(bytes: &[u8]) -> Option<&[u8]> {
        let (_, n1) = read_varint(bytes)?;
        let rest = &bytes[n1..];
        let (word_len, n2) = read_varint(rest)?;
        let rest = &rest[n2..];
        rest.get(..word_len as usize)
    }

    pub fn cmp_encoded(a: &[u8], b: &[u8]) -> Ordering {
        let da = TextKey::from_bytes(a);
        let db = TextKey::from_bytes(b);
        match (da, db) {
            (Some(da), Some(db)) => da
                .word
                .cmp(&db.word)
                .then(da.timestamp.cmp(&db.timestamp))
                .then(da.note_key.cmp(&db.note_key))
                .then(da.word_index.cmp(&db.word_index)),
            _ => a.cmp(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_ts_key_orders_by_id_then_timestamp() {
        let a = IdTsKey { id: [0u8; 32], timestamp: 5 }.to_bytes();
        let mut id2 = [0u8; 32];
        id2[31] = 1;
        let b = IdTsKey { id: id2, timestamp: 1 }.to_bytes();
        assert_eq!(IdTsKey::cmp_encoded(&a, &b), Ordering::Less);
    }

    #[test]
    fn u64_ts_key_roundtrip() {
        let k = U64TsKey { value: 7, timestamp: 42 };
        let bytes = k.to_bytes();
        assert_eq!(U64TsKey::from_bytes(&bytes), k);
    }

    #[test]
    fn search_key_prefix_sorts_before_extension() {
        let a = SearchKey { pubkey: [0; 32], timestamp: 0, search: "al".into() }.to_bytes();
        let b = SearchKey { pubkey: [0; 32], timestamp: 0, search: "alice".into() }.to_bytes();
        assert_eq!(SearchKey::cmp_encoded(&a, &b), Ordering::Less);
    }

    #[test]
    fn varint_roundtrip() {
        for v in [0u64, 1, 127, 128, 300, u64::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, v);
            let (decoded, used) = read_varint(&buf).unwrap();
            assert_eq!(decoded, v);
            assert_eq!(used, buf.len());
        }
    }

    #[test]
    fn text_key_compares_by_word_not_layout_order() {
        let a = TextKey { note_key: 100, word: b"zzz".to_vec(), timestamp: 1, word_index: 0 };
        let b = TextKey { note_key: 1, word: b"aaa".to_vec(), timestamp: 1, word_index: 0 };
        let ab = a.to_bytes().unwrap();
        let bb = b.to_bytes().unwrap();
        // physically a's note_key (100) > b's (1), but word "zzz" > "aaa" dominates comparison
        assert_eq!(TextKey::cmp_encoded(&ab, &bb), Ordering::Greater);
    }

    #[test]
    fn text_key_over_budget_is_skipped() {
        let huge = TextKey {
            note_key: 1,
            word: vec![b'a'; TEXT_KEY_BUDGET + 10],
            timestamp: 1,
            word_index: 0,
        };
        assert!(huge.to_bytes().is_none());
    }
}
