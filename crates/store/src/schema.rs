//! Table definitions and the `redb::Key` wrappers around `nostrdb-core`'s
//! index key encodings (§3.4, §6.1). `nostrdb-core` stays free of a `redb`
//! dependency, so the comparator registration lives here, one newtype per
//! key shape — mirroring how `dolos-redb3` wraps its own composite keys
//! (`DbPendingKey`, `DbTxHash` in `mempool.rs`) rather than implementing
//! foreign traits on foreign types.

use std::cmp::Ordering;

use nostrdb_core::keys::{IdTsKey, SearchKey, TextKey, U64TsKey};
use redb::{Key as RedbKey, TableDefinition, TypeName, Value};

/// `note_id` and `profile_pubkey`/`note_author` share this shape: `(id or
/// pubkey, created_at)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdTs(pub IdTsKey);

impl Value for IdTs {
    type SelfType<'a> = IdTs;
    type AsBytes<'a> = [u8; IdTsKey::ENCODED_LEN];

    fn fixed_width() -> Option<usize> {
        Some(IdTsKey::ENCODED_LEN)
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        IdTs(IdTsKey::from_bytes(data))
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        value.0.to_bytes()
    }

    fn type_name() -> TypeName {
        TypeName::new("nostrdb_id_ts_key")
    }
}

impl RedbKey for IdTs {
    fn compare(data1: &[u8], data2: &[u8]) -> Ordering {
        IdTsKey::cmp_encoded(data1, data2)
    }
}

/// `note_kind`/`note_created` shape: `(u64, u64)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct U64Ts(pub U64TsKey);

impl Value for U64Ts {
    type SelfType<'a> = U64Ts;
    type AsBytes<'a> = [u8; U64TsKey::ENCODED_LEN];

    fn fixed_width() -> Option<usize> {
        Some(U64TsKey::ENCODED_LEN)
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        U64Ts(U64TsKey::from_bytes(data))
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        value.0.to_bytes()
    }

    fn type_name() -> TypeName {
        TypeName::new("nostrdb_u64_ts_key")
    }
}

impl RedbKey for U64Ts {
    fn compare(data1: &[u8], data2: &[u8]) -> Ordering {
        U64TsKey::cmp_encoded(data1, data2)
    }
}

/// `profile_search` key: variable-length `(search, timestamp, pubkey)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDbKey(pub SearchKey);

impl Value for SearchDbKey {
    type SelfType<'a> = SearchDbKey;
    type AsBytes<'a> = Vec<u8>;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        SearchDbKey(SearchKey::from_bytes(data))
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        value.0.to_bytes()
    }

    fn type_name() -> TypeName {
        TypeName::new("nostrdb_search_key")
    }
}

impl RedbKey for SearchDbKey {
    fn compare(data1: &[u8], data2: &[u8]) -> Ordering {
        SearchKey::cmp_encoded(data1, data2)
    }
}

/// `note_text` key: the varint-packed [`TextKey`], whose comparator ignores
/// physical byte order (§3.4). Rows with a key exceeding
/// [`nostrdb_core::keys::TEXT_KEY_BUDGET`] are never constructed — callers
/// filter before insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDbKey(pub TextKey);

impl Value for TextDbKey {
    type SelfType<'a> = TextDbKey;
    type AsBytes<'a> = Vec<u8>;

    fn fixed_width() -> Option<usize> {
        None
    }

    fn from_bytes<'a>(data: &'a [u8]) -> Self::SelfType<'a>
    where
        Self: 'a,
    {
        TextDbKey(TextKey::from_bytes(data).expect("stored text key is well-formed"))
    }

    fn as_bytes<'a, 'b: 'a>(value: &'a Self::SelfType<'b>) -> Self::AsBytes<'a>
    where
        Self: 'b,
    {
        value
            .0
            .to_bytes()
            .expect("caller filters over-budget text keys before insert")
    }

    fn type_name() -> TypeName {
        TypeName::new("nostrdb_text_key")
    }
}

impl RedbKey for TextDbKey {
    fn compare(data1: &[u8], data2: &[u8]) -> Ordering {
        TextKey::cmp_encoded(data1, data2)
    }
}

// --- table definitions (§6.1's twelve required databases, plus the three
// query-planner indices this expansion adds: `note_author`, `note_tag`,
// `note_created`) ---
//
// §6.1 asks for duplicate-key support on `note_id`, `profile_pubkey`,
// `note_kind` and `note_text` — the reference KV store's DUPSORT mechanism.
// Here every one of those keys already carries its disambiguating suffix
// (`created_at`, or `note_key`/`word_index` for text), so two entries never
// collide on the full key; a plain (non-multimap) table with an ordered
// composite key gives the same "walk all entries for this prefix" access
// pattern DUPSORT would, without a second redb table kind.

pub const NOTES: TableDefinition<'static, u64, &'static [u8]> = TableDefinition::new("notes");

pub const NOTE_META: TableDefinition<'static, &'static [u8; 32], &'static [u8]> =
    TableDefinition::new("note_meta");

pub const PROFILES: TableDefinition<'static, u64, &'static [u8]> =
    TableDefinition::new("profiles");

pub const PROFILE_SEARCH: TableDefinition<'static, SearchDbKey, u64> =
    TableDefinition::new("profile_search");

pub const NDB_META: TableDefinition<'static, u16, &'static [u8]> =
    TableDefinition::new("ndb_meta");

pub const PROFILE_LAST_FETCH: TableDefinition<'static, &'static [u8; 32], u64> =
    TableDefinition::new("profile_last_fetch");

pub const NOTE_ID: TableDefinition<'static, IdTs, u64> = TableDefinition::new("note_id");

pub const PROFILE_PUBKEY: TableDefinition<'static, IdTs, u64> =
    TableDefinition::new("profile_pubkey");

pub const NOTE_KIND: TableDefinition<'static, U64Ts, u64> = TableDefinition::new("note_kind");

pub const NOTE_TEXT: TableDefinition<'static, TextDbKey, u64> = TableDefinition::new("note_text");

pub const NOTE_BLOCKS: TableDefinition<'static, u64, &'static [u8]> =
    TableDefinition::new("note_blocks");

/// Added for the AUTHORS plan (§4.5): `(pubkey, created_at) → note_key`,
/// for any note (not just profiles).
pub const NOTE_AUTHOR: TableDefinition<'static, IdTs, u64> = TableDefinition::new("note_author");

/// Added for the TAGS plan (§4.5): raw byte-lex key
/// `label(1) | value_len(2 BE) | value | created_at(8 BE) | note_key(8 BE)`.
pub const NOTE_TAG: TableDefinition<'static, &'static [u8], u64> = TableDefinition::new("note_tag");

/// Added for the CREATED plan (§4.5): `(created_at, note_key) → note_key`.
pub const NOTE_CREATED: TableDefinition<'static, U64Ts, u64> = TableDefinition::new("note_created");

pub const VERSION_KEY: u16 = 1;

pub fn encode_tag_key(label: u8, value: &[u8], created_at: u64, note_key: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 2 + value.len() + 16);
    out.push(label);
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
    out.extend_from_slice(&created_at.to_be_bytes());
    out.extend_from_slice(&note_key.to_be_bytes());
    out
}

pub fn tag_key_prefix(label: u8, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 2 + value.len());
    out.push(label);
    out.extend_from_slice(&(value.len() as u16).to_be_bytes());
    out.extend_from_slice(value);
    out
}
