//! The migration framework (§4.9): a vector of functions indexed by
//! version, run in order against `ndb_meta[VERSION_KEY]`. A freshly
//! created database (the version key has never been written) is
//! initialized straight to [`LATEST_VERSION`], since [`crate::open`]'s
//! call to `initialize` already built every table this version expects.

use nostrdb_core::note::Note;
use redb::{Database, ReadableTable};

use crate::profiles::ProfileRecord;
use crate::{meta, notes, profiles, schema, tags, Error, Result};

/// Migration 4 adds the `note_author`/`note_tag`/`note_created` indices
/// backing the AUTHORS/TAGS/CREATED query plans.
pub const LATEST_VERSION: u64 = 4;

type Migration = fn(&Database) -> Result<()>;

const MIGRATIONS: [Migration; LATEST_VERSION as usize] = [
    migration_1_build_profile_search,
    migration_2_rebuild_case_insensitive,
    migration_3_reparse_profiles,
    migration_4_rebuild_query_planner_indices,
];

/// Runs every migration from `stored+1..=LATEST_VERSION` in order,
/// bumping the stored version after each success (§4.9).
pub fn run(db: &Database) -> Result<()> {
    let stored = {
        let rx = db.begin_read()?;
        meta::read_version(&rx)?
    };

    let stored = match stored {
        None => {
            let wx = db.begin_write()?;
            meta::write_version(&wx, LATEST_VERSION)?;
            wx.commit()?;
            return Ok(());
        }
        Some(v) => v,
    };

    if stored > LATEST_VERSION {
        return Err(Error::UnknownSchemaVersion(stored));
    }

    for version in (stored + 1)..=LATEST_VERSION {
        tracing::info!(version, "running migration");
        let migration = MIGRATIONS[(version - 1) as usize];
        migration(db)?;
        let wx = db.begin_write()?;
        meta::write_version(&wx, version)?;
        wx.commit()?;
    }
    Ok(())
}

/// Rebuilds `profile_search` from `profile_pubkey` + `profiles`: the
/// join gives back the `(pubkey, created_at)` a stored `ProfileRecord`
/// no longer carries on its own.
fn rebuild_profile_search(db: &Database) -> Result<()> {
    let wx = db.begin_write()?;
    {
        let mut search = wx.open_table(schema::PROFILE_SEARCH)?;
        let stale: Vec<_> = search.iter()?.map(|e| e.map(|(k, _)| k.value())).collect::<std::result::Result<_, _>>()?;
        for key in stale {
            search.remove(key)?;
        }
    }
    let entries: Vec<(schema::IdTs, u64)> = {
        let profile_pubkey = wx.open_table(schema::PROFILE_PUBKEY)?;
        profile_pubkey
            .iter()?
            .map(|e| e.map(|(k, v)| (k.value(), v.value())))
            .collect::<std::result::Result<_, _>>()?
    };
    for (id_ts, profile_key) in entries {
        let record: Option<ProfileRecord> = {
            let profiles_table = wx.open_table(schema::PROFILES)?;
            match profiles_table.get(profile_key)? {
                Some(v) => Some(
                    bincode::deserialize(v.value())
                        .map_err(|_| Error::CorruptRecord { table: "profiles" })?,
                ),
                None => None,
            }
        };
        if let Some(record) = record {
            profiles::write_search_entries(&wx, &id_ts.0.id, id_ts.0.timestamp, profile_key, &record)?;
        }
    }
    wx.commit()?;
    Ok(())
}

/// Migration 1 (§4.9): build initial profile-search indices.
fn migration_1_build_profile_search(db: &Database) -> Result<()> {
    rebuild_profile_search(db)
}

/// Migration 2 (§4.9): drop and rebuild with case-insensitive keying.
/// [`nostrdb_core::keys::search_prefix`] already lowercases ASCII, so
/// this is the same rebuild as migration 1 — re-running it is what
/// makes the case-insensitive keying take effect for rows written under
/// an older comparator.
fn migration_2_rebuild_case_insensitive(db: &Database) -> Result<()> {
    rebuild_profile_search(db)
}

/// Migration 3 (§4.9): re-parse every profile's note content, correcting
/// UTF-8 handling of `name`/`display_name`, and rewrite both `profiles`
/// and `profile_search`.
fn migration_3_reparse_profiles(db: &Database) -> Result<()> {
    let wx = db.begin_write()?;

    let keys: Vec<u64> = {
        let table = wx.open_table(schema::PROFILES)?;
        table.iter()?.map(|e| e.map(|(k, _)| k.value())).collect::<std::result::Result<_, _>>()?
    };

    for profile_key in keys {
        let old: ProfileRecord = {
            let table = wx.open_table(schema::PROFILES)?;
            let value = table.get(profile_key)?.expect("key came from this table's own iterator");
            bincode::deserialize(value.value()).map_err(|_| Error::CorruptRecord { table: "profiles" })?
        };

        let note_bytes: Option<Vec<u8>> = {
            let notes_table = wx.open_table(schema::NOTES)?;
            notes_table.get(old.note_key)?.map(|v| v.value().to_vec())
        };
        let Some(note_bytes) = note_bytes else {
            continue;
        };
        let note = Note::from_bytes(&note_bytes)?;
        let fresh = ProfileRecord::from_content(&note.content(), old.received_at, old.note_key);

        {
            let mut table = wx.open_table(schema::PROFILES)?;
            let bytes = bincode::serialize(&fresh).expect("ProfileRecord always serializes");
            table.insert(profile_key, bytes.as_slice())?;
        }
    }

    wx.commit()?;
    rebuild_profile_search(db)
}

/// Migration 4 (this expansion's addition): rebuilds `note_author`,
/// `note_tag`, and `note_created` from the existing `notes` store.
fn migration_4_rebuild_query_planner_indices(db: &Database) -> Result<()> {
    let wx = db.begin_write()?;

    {
        let mut note_author = wx.open_table(schema::NOTE_AUTHOR)?;
        let stale: Vec<_> =
            note_author.iter()?.map(|e| e.map(|(k, _)| k.value())).collect::<std::result::Result<_, _>>()?;
        for key in stale {
            note_author.remove(key)?;
        }
    }
    {
        let mut note_created = wx.open_table(schema::NOTE_CREATED)?;
        let stale: Vec<_> =
            note_created.iter()?.map(|e| e.map(|(k, _)| k.value())).collect::<std::result::Result<_, _>>()?;
        for key in stale {
            note_created.remove(key)?;
        }
    }
    {
        let mut note_tag = wx.open_table(schema::NOTE_TAG)?;
        let stale: Vec<Vec<u8>> =
            note_tag.iter()?.map(|e| e.map(|(k, _)| k.value().to_vec())).collect::<std::result::Result<_, _>>()?;
        for key in stale {
            note_tag.remove(key.as_slice())?;
        }
    }

    let entries: Vec<(u64, Vec<u8>)> = {
        let notes_table = wx.open_table(schema::NOTES)?;
        notes_table
            .iter()?
            .map(|e| e.map(|(k, v)| (k.value(), v.value().to_vec())))
            .collect::<std::result::Result<_, _>>()?
    };

    for (note_key, bytes) in entries {
        let note = Note::from_bytes(&bytes)?;
        notes::write_added_indices(&wx, &note, note_key)?;
        tags::write_note_tags(&wx, &note, note_key)?;
    }

    wx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_database_lands_on_the_latest_version_without_running_migrations() {
        let db = crate::in_memory().unwrap();
        let rx = db.begin_read().unwrap();
        assert_eq!(meta::read_version(&rx).unwrap(), Some(LATEST_VERSION));
    }

    #[test]
    fn running_migrations_twice_is_idempotent() {
        let db = crate::in_memory().unwrap();
        run(&db).unwrap();
        run(&db).unwrap();
        let rx = db.begin_read().unwrap();
        assert_eq!(meta::read_version(&rx).unwrap(), Some(LATEST_VERSION));
    }

    #[test]
    fn migration_4_rebuilds_note_author_from_notes() {
        use nostrdb_core::builder::NoteBuilder;

        let db = crate::in_memory().unwrap();
        let mut b = NoteBuilder::new();
        b.set_id([1u8; 32]).set_pubkey([2u8; 32]).set_sig([0u8; 64]).set_kind(1).set_created_at(42);
        b.set_content(b"hi").unwrap();
        let mut buf = vec![0u8; 4096];
        let size = b.finalize(&mut buf, None).unwrap();
        buf.truncate(size);
        let note = Note::from_bytes(&buf).unwrap();

        let wx = db.begin_write().unwrap();
        crate::notes::write_note(&wx, &note).unwrap();
        wx.commit().unwrap();

        migration_4_rebuild_query_planner_indices(&db).unwrap();

        let rx = db.begin_read().unwrap();
        let keys = crate::query::scan_author(&rx, &[2u8; 32], None, 10).unwrap();
        assert_eq!(keys, vec![1]);
    }
}
