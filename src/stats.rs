//! `stats()` (§6.2), pinned down to a concrete shape by the per-kind
//! breakdown the original C implementation tracks
//! (`examples/original_source/nostrdb/src/nostrdb.c`'s `ndb_stat`): a
//! fixed set of "common" kinds get their own counter, everything else
//! rolls into one aggregate.

use std::collections::HashMap;

use nostrdb_core::note::Note;
use nostrdb_store::schema;
use redb::{ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata};

/// Kinds the original breaks out individually: metadata (0), text note
/// (1), contacts (3), deletion (5), repost (6), reaction (7), zap receipt
/// (9735), and long-form content (30023).
pub const COMMON_KINDS: [u32; 8] = [0, 1, 3, 5, 6, 7, 9735, 30023];

/// Per-table row count and on-disk footprint, one entry per §6.1-named
/// database.
#[derive(Debug, Clone, Default)]
pub struct DbStat {
    pub name: &'static str,
    pub entries: u64,
    pub metadata_bytes: u64,
    pub stored_bytes: u64,
}

/// `stats()`'s full result (§6.2): one [`DbStat`] per named database, plus
/// the kind-breakdown the original tracks on top.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub dbs: [DbStat; 12],
    pub common_kinds: HashMap<u32, u64>,
    pub other_kinds: u64,
}

/// Computes [`Stats`] in one read transaction: per-table counts via `redb`'s
/// own `TableStats` plus a single scan of `notes` for the kind breakdown.
pub fn compute(db: &redb::Database) -> nostrdb_store::Result<Stats> {
    let rx = db.begin_read()?;

    let dbs = [
        table_stat("notes", &rx, schema::NOTES)?,
        table_stat("note_meta", &rx, schema::NOTE_META)?,
        table_stat("profiles", &rx, schema::PROFILES)?,
        table_stat("profile_search", &rx, schema::PROFILE_SEARCH)?,
        table_stat("ndb_meta", &rx, schema::NDB_META)?,
        table_stat("profile_last_fetch", &rx, schema::PROFILE_LAST_FETCH)?,
        table_stat("note_id", &rx, schema::NOTE_ID)?,
        table_stat("profile_pubkey", &rx, schema::PROFILE_PUBKEY)?,
        table_stat("note_kind", &rx, schema::NOTE_KIND)?,
        table_stat("note_text", &rx, schema::NOTE_TEXT)?,
        table_stat("note_blocks", &rx, schema::NOTE_BLOCKS)?,
        // the host's free-list bookkeeping (§6.1) isn't a table `redb` exposes through this API
        DbStat { name: "freelist", ..Default::default() },
    ];

    let mut common_kinds = HashMap::new();
    let mut other_kinds = 0u64;
    {
        let table = rx.open_table(schema::NOTES)?;
        for entry in table.iter()? {
            let (_, value) = entry?;
            let Ok(note) = Note::from_bytes(value.value()) else {
                continue;
            };
            if COMMON_KINDS.contains(&note.kind()) {
                *common_kinds.entry(note.kind()).or_insert(0) += 1;
            } else {
                other_kinds += 1;
            }
        }
    }

    Ok(Stats { dbs, common_kinds, other_kinds })
}

fn table_stat<K, V>(
    name: &'static str,
    rx: &ReadTransaction,
    def: redb::TableDefinition<K, V>,
) -> nostrdb_store::Result<DbStat>
where
    K: redb::Key + 'static,
    V: redb::Value + 'static,
{
    let table = rx.open_table(def)?;
    let stats = table.stats()?;
    Ok(DbStat {
        name,
        entries: table.len()?,
        metadata_bytes: stats.metadata_bytes() as u64,
        stored_bytes: stats.stored_bytes() as u64,
    })
}
