//! Profile records, profile search, and the `last_profile_fetch` policy
//! (§3.6, §4.4 steps 7-10, §4.6).

use std::collections::HashSet;

use nostrdb_core::keys::{search_prefix, IdTsKey, SearchKey};
use nostrdb_core::note::Note;
use redb::{ReadTransaction, ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};

use crate::schema::{self, IdTs, SearchDbKey};
use crate::{notes, Error, Result};

/// The compact profile record (§3.6): `name`, `display_name`, `lnurl`,
/// `received_at`, and `note_key` are the minimum required fields; the
/// rest are the remaining standard kind-0 fields, kept because they cost
/// nothing semantically once the content JSON is already being parsed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfileRecord {
    pub name: String,
    pub display_name: String,
    pub about: String,
    pub picture: String,
    pub banner: String,
    pub website: String,
    pub lnurl: String,
    pub nip05: String,
    pub received_at: u64,
    pub note_key: u64,
}

impl ProfileRecord {
    pub(crate) fn from_content(content: &str, received_at: u64, note_key: u64) -> Self {
        let value: serde_json::Value =
            serde_json::from_str(content).unwrap_or(serde_json::Value::Null);
        let field = |key: &str| value.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string();
        let lnurl = match value.get("lud16").and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => field("lud06"),
        };
        ProfileRecord {
            name: field("name"),
            display_name: field("display_name"),
            about: field("about"),
            picture: field("picture"),
            banner: field("banner"),
            website: field("website"),
            lnurl,
            nip05: field("nip05"),
            received_at,
            note_key,
        }
    }
}

pub fn next_profile_key(wx: &WriteTransaction) -> Result<u64> {
    let table = wx.open_table(schema::PROFILES)?;
    let last = table.last()?.map(|(k, _)| k.value());
    Ok(last.unwrap_or(0) + 1)
}

/// The per-profile write sequence (§4.4 steps 7-10): runs the note path
/// first (§4.6 — profile notes are not deduped against each other since
/// each carries a distinct id, only a literal retransmission of the same
/// signed event is dropped), then builds the profile record and its
/// indices. `fetched_at` is the wall-clock ingest time used for
/// `last_profile_fetch` (distinct from the note's own `created_at`).
pub fn write_profile(
    wx: &WriteTransaction,
    note: &Note<'_>,
    fetched_at: u64,
) -> Result<Option<(u64, u64)>> {
    let Some(note_key) = notes::write_note(wx, note)? else {
        return Ok(None);
    };

    update_last_fetch(wx, note.pubkey(), note.created_at(), fetched_at)?;

    let profile_key = next_profile_key(wx)?;
    let record = ProfileRecord::from_content(&note.content(), fetched_at, note_key);
    let bytes = bincode::serialize(&record).expect("ProfileRecord always serializes");
    {
        let mut profiles = wx.open_table(schema::PROFILES)?;
        profiles.insert(profile_key, bytes.as_slice())?;
    }
    {
        let mut profile_pubkey = wx.open_table(schema::PROFILE_PUBKEY)?;
        profile_pubkey.insert(
            IdTs(IdTsKey {
                id: *note.pubkey(),
                timestamp: note.created_at(),
            }),
            profile_key,
        )?;
    }

    write_search_entries(wx, note.pubkey(), note.created_at(), profile_key, &record)?;

    Ok(Some((note_key, profile_key)))
}

/// Step 10's search-entry fan-out, factored out so migrations 1/2 can
/// rebuild `profile_search` from the `profiles` store without re-running
/// the whole per-profile write sequence.
pub(crate) fn write_search_entries(
    wx: &WriteTransaction,
    pubkey: &[u8; 32],
    created_at: u64,
    profile_key: u64,
    record: &ProfileRecord,
) -> Result<()> {
    let mut seen = HashSet::new();
    for name in [record.name.as_str(), record.display_name.as_str()] {
        if name.is_empty() || !seen.insert(name) {
            continue;
        }
        write_search_entry(wx, pubkey, created_at, name, profile_key)?;
    }
    Ok(())
}

fn write_search_entry(
    wx: &WriteTransaction,
    pubkey: &[u8; 32],
    created_at: u64,
    name: &str,
    profile_key: u64,
) -> Result<()> {
    let mut table = wx.open_table(schema::PROFILE_SEARCH)?;
    let key = SearchDbKey(SearchKey {
        pubkey: *pubkey,
        timestamp: created_at,
        search: search_prefix(name),
    });
    table.insert(key, profile_key)?;
    Ok(())
}

/// Bumps `last_profile_fetch[pubkey]` to `fetched_at` only if no
/// already-stored profile for `pubkey` is newer than `incoming_created_at`
/// (§3.6, §8.1 property 8). Must run before the incoming profile's own
/// `profile_pubkey` entry is written, so it doesn't see itself.
fn update_last_fetch(
    wx: &WriteTransaction,
    pubkey: &[u8; 32],
    incoming_created_at: u64,
    fetched_at: u64,
) -> Result<()> {
    let is_newest = {
        let profile_pubkey = wx.open_table(schema::PROFILE_PUBKEY)?;
        let low = IdTs(IdTsKey {
            id: *pubkey,
            timestamp: incoming_created_at.saturating_add(1),
        });
        let high = IdTs(IdTsKey {
            id: *pubkey,
            timestamp: u64::MAX,
        });
        profile_pubkey.range(low..=high)?.next().is_none()
    };
    if is_newest {
        let mut table = wx.open_table(schema::PROFILE_LAST_FETCH)?;
        table.insert(pubkey, fetched_at)?;
    }
    Ok(())
}

pub fn get_by_key(rx: &ReadTransaction, profile_key: u64) -> Result<Option<ProfileRecord>> {
    let table = rx.open_table(schema::PROFILES)?;
    let Some(value) = table.get(profile_key)? else {
        return Ok(None);
    };
    let record = bincode::deserialize(value.value()).map_err(|_| Error::CorruptRecord { table: "profiles" })?;
    Ok(Some(record))
}

/// "Newer wins" lookup (§4.6, §8.1 property 7): seeks the greatest bound
/// of the clustered `(pubkey, created_at)` index.
pub fn get_by_pubkey(rx: &ReadTransaction, pubkey: &[u8; 32]) -> Result<Option<ProfileRecord>> {
    let profile_pubkey = rx.open_table(schema::PROFILE_PUBKEY)?;
    let low = IdTs(IdTsKey { id: *pubkey, timestamp: 0 });
    let high = IdTs(IdTsKey {
        id: *pubkey,
        timestamp: u64::MAX,
    });
    let Some(entry) = profile_pubkey.range(low..=high)?.next_back() else {
        return Ok(None);
    };
    let (_, value) = entry?;
    get_by_key(rx, value.value())
}

/// `WRITE_LAST_FETCH` (§4.4): unconditionally records that `pubkey` was
/// checked at `fetched_at`, independent of whether a newer profile was
/// seen — distinct from the monotonic bump [`write_profile`] performs as
/// part of its own write sequence.
pub fn force_last_fetch(wx: &WriteTransaction, pubkey: &[u8; 32], fetched_at: u64) -> Result<()> {
    let mut table = wx.open_table(schema::PROFILE_LAST_FETCH)?;
    table.insert(pubkey, fetched_at)?;
    Ok(())
}

pub fn read_last_fetch(rx: &ReadTransaction, pubkey: &[u8; 32]) -> Result<Option<u64>> {
    let table = rx.open_table(schema::PROFILE_LAST_FETCH)?;
    Ok(table.get(pubkey)?.map(|v| v.value()))
}
