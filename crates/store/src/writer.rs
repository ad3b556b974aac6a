//! The transactional batch-commit primitive (§4.4): one write txn per
//! batch, dispatching each [`WriteMessage`] to the matching per-note,
//! per-profile, or side-channel write sequence. The dedicated writer
//! thread, its inbox, batching policy, and the post-commit monitor
//! fan-out (§4.8) live one layer up in the root crate's `nostrdb::writer`,
//! which drives a [`Store`] as its backend — this module only owns "what
//! one batch does to the database."

use std::sync::Arc;

use nostrdb_core::note::Note;
use redb::Database;

use crate::{blocks, meta, notes, profiles, text_index, Result};

/// §4.4's message types, minus `QUIT` (a thread-control signal the root
/// crate's writer loop handles before a message ever reaches a batch).
#[derive(Debug, Clone)]
pub enum WriteMessage {
    WriteNote { bytes: Vec<u8> },
    WriteProfile { bytes: Vec<u8>, fetched_at: u64 },
    WriteBlocks { note_key: u64, content: String },
    WriteDbMeta { version: u64 },
    WriteLastFetch { pubkey: [u8; 32], fetched_at: u64 },
}

/// A batch of messages destined for one write transaction.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    messages: Vec<WriteMessage>,
}

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch::default()
    }

    pub fn push(&mut self, message: WriteMessage) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// What a committed batch did, for logging and for the caller's
/// post-commit monitor pass (§4.8): `new_note_keys` carries the
/// `{note_key, note}` pairs (by key — note bytes are re-read by the
/// caller) the monitor matches against live subscriptions.
#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    pub notes_written: usize,
    pub notes_duplicate: usize,
    pub profiles_written: usize,
    pub reactions_applied: usize,
    pub new_note_keys: Vec<u64>,
}

/// The store-side half of the writer (§4.4). Wraps the shared
/// [`Database`] handle; cheap to clone, safe to hand to one dedicated
/// thread.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    pub fn new(db: Arc<Database>) -> Self {
        Store { db }
    }

    /// Commits `batch` in a single write transaction. Open Question 4:
    /// any per-message error propagates out and aborts the whole
    /// transaction — `redb::WriteTransaction::commit` never runs, so no
    /// partial state becomes visible to readers (§4.4's failure
    /// semantics, §8.1 property 13's idempotence counterpart for writes).
    #[tracing::instrument(skip(self, batch), fields(messages = batch.len()))]
    pub fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome> {
        let wx = self.db.begin_write()?;
        let mut outcome = CommitOutcome::default();

        for message in batch.messages {
            match message {
                WriteMessage::WriteNote { bytes } => {
                    let note = Note::from_bytes(&bytes)?;
                    self.write_note(&wx, &note, &mut outcome)?;
                }
                WriteMessage::WriteProfile { bytes, fetched_at } => {
                    let note = Note::from_bytes(&bytes)?;
                    match profiles::write_profile(&wx, &note, fetched_at)? {
                        Some((note_key, _profile_key)) => {
                            finish_note_side_effects(&wx, &note, note_key, &mut outcome)?;
                            outcome.profiles_written += 1;
                        }
                        None => outcome.notes_duplicate += 1,
                    }
                }
                WriteMessage::WriteBlocks { note_key, content } => {
                    blocks::write_from_content(&wx, note_key, &content)?;
                }
                WriteMessage::WriteDbMeta { version } => {
                    meta::write_version(&wx, version)?;
                }
                WriteMessage::WriteLastFetch { pubkey, fetched_at } => {
                    profiles::force_last_fetch(&wx, &pubkey, fetched_at)?;
                }
            }
        }

        wx.commit()?;
        tracing::debug!(
            notes_written = outcome.notes_written,
            notes_duplicate = outcome.notes_duplicate,
            profiles_written = outcome.profiles_written,
            reactions_applied = outcome.reactions_applied,
            "batch committed"
        );
        Ok(outcome)
    }

    fn write_note(
        &self,
        wx: &redb::WriteTransaction,
        note: &Note<'_>,
        outcome: &mut CommitOutcome,
    ) -> Result<()> {
        match notes::write_note(wx, note)? {
            Some(note_key) => finish_note_side_effects(wx, note, note_key, outcome),
            None => {
                outcome.notes_duplicate += 1;
                Ok(())
            }
        }
    }
}

/// Steps 5-6 of the per-note write (§4.4): eager blocks/text-index for
/// kinds {1, 30023}, and the reaction counter for kind 7. Shared between
/// `WRITE_NOTE` and `WRITE_PROFILE` (the profile path runs the note path
/// first).
fn finish_note_side_effects(
    wx: &redb::WriteTransaction,
    note: &Note<'_>,
    note_key: u64,
    outcome: &mut CommitOutcome,
) -> Result<()> {
    blocks::write_eager(wx, note, note_key)?;
    text_index::write_note_text(wx, note, note_key)?;
    if note.kind() == 7 {
        if let Some(liked_id) = reacted_id(note) {
            meta::increment_reactions(wx, &liked_id)?;
            outcome.reactions_applied += 1;
        }
    }
    outcome.notes_written += 1;
    outcome.new_note_keys.push(note_key);
    Ok(())
}

/// The target id of a kind-7 reaction: the value of its last `e` tag
/// (§3.6). Reactions accumulate against a raw id, not a `note_key`,
/// since the target note may not have been ingested yet.
fn reacted_id(note: &Note<'_>) -> Option<[u8; 32]> {
    let mut last = None;
    for tag in note.tags() {
        if tag.count() < 2 {
            continue;
        }
        let Some(label_packed) = tag.get(0) else { continue };
        if note.render_packed(label_packed).as_ref() != "e" {
            continue;
        }
        let Some(value_packed) = tag.get(1) else { continue };
        let hex_str = note.render_packed(value_packed);
        let mut id = [0u8; 32];
        if hex::decode_to_slice(hex_str.as_bytes(), &mut id).is_ok() {
            last = Some(id);
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostrdb_core::builder::NoteBuilder;

    fn build_note(id: u8, kind: u32, content: &str) -> Vec<u8> {
        let mut b = NoteBuilder::new();
        b.set_id([id; 32]).set_pubkey([2u8; 32]).set_sig([0u8; 64]).set_kind(kind).set_created_at(1);
        b.set_content(content.as_bytes()).unwrap();
        let mut buf = vec![0u8; 4096];
        let size = b.finalize(&mut buf, None).unwrap();
        buf.truncate(size);
        buf
    }

    fn build_reaction(id: u8, liked: [u8; 32]) -> Vec<u8> {
        let mut b = NoteBuilder::new();
        b.set_id([id; 32]).set_pubkey([3u8; 32]).set_sig([0u8; 64]).set_kind(7).set_created_at(1);
        b.set_content(b"+").unwrap();
        b.begin_tag();
        b.push_tag_element(b"e").unwrap();
        b.push_tag_element(hex::encode(liked).as_bytes()).unwrap();
        let mut buf = vec![0u8; 4096];
        let size = b.finalize(&mut buf, None).unwrap();
        buf.truncate(size);
        buf
    }

    #[test]
    fn a_batch_with_a_note_and_a_reaction_commits_together() {
        let db = crate::in_memory().unwrap();
        let store = Store::new(db.clone());

        let liked = [5u8; 32];
        let mut first = WriteBatch::new();
        first.push(WriteMessage::WriteNote { bytes: build_note(1, 1, "hi") });
        let outcome = store.commit(first).unwrap();
        assert_eq!(outcome.notes_written, 1);

        let mut second = WriteBatch::new();
        second.push(WriteMessage::WriteNote { bytes: build_note_with_id(liked, 1, "liked post") });
        second.push(WriteMessage::WriteNote { bytes: build_reaction(9, liked) });
        let outcome = store.commit(second).unwrap();
        assert_eq!(outcome.notes_written, 2);
        assert_eq!(outcome.reactions_applied, 1);

        let rx = db.begin_read().unwrap();
        assert_eq!(meta::read_note_meta(&rx, &liked).unwrap().unwrap().reactions, 1);
    }

    #[test]
    fn duplicate_note_in_a_later_batch_is_not_recommitted() {
        let db = crate::in_memory().unwrap();
        let store = Store::new(db);
        let bytes = build_note(2, 1, "hello");

        let mut first = WriteBatch::new();
        first.push(WriteMessage::WriteNote { bytes: bytes.clone() });
        assert_eq!(store.commit(first).unwrap().notes_written, 1);

        let mut second = WriteBatch::new();
        second.push(WriteMessage::WriteNote { bytes });
        let outcome = store.commit(second).unwrap();
        assert_eq!(outcome.notes_written, 0);
        assert_eq!(outcome.notes_duplicate, 1);
    }

    #[test]
    fn write_dbmeta_sets_the_schema_version() {
        let db = crate::in_memory().unwrap();
        let store = Store::new(db.clone());
        let mut batch = WriteBatch::new();
        batch.push(WriteMessage::WriteDbMeta { version: 7 });
        store.commit(batch).unwrap();

        let rx = db.begin_read().unwrap();
        assert_eq!(meta::read_version(&rx).unwrap(), Some(7));
    }

    fn build_note_with_id(id: [u8; 32], kind: u32, content: &str) -> Vec<u8> {
        let mut b = NoteBuilder::new();
        b.set_id(id).set_pubkey([2u8; 32]).set_sig([0u8; 64]).set_kind(kind).set_created_at(1);
        b.set_content(content.as_bytes()).unwrap();
        let mut buf = vec![0u8; 4096];
        let size = b.finalize(&mut buf, None).unwrap();
        buf.truncate(size);
        buf
    }

    fn build_reaction_with_two_e_tags(id: u8, first: [u8; 32], second: [u8; 32]) -> Vec<u8> {
        let mut b = NoteBuilder::new();
        b.set_id([id; 32]).set_pubkey([3u8; 32]).set_sig([0u8; 64]).set_kind(7).set_created_at(1);
        b.set_content(b"+").unwrap();
        b.begin_tag();
        b.push_tag_element(b"e").unwrap();
        b.push_tag_element(hex::encode(first).as_bytes()).unwrap();
        b.begin_tag();
        b.push_tag_element(b"e").unwrap();
        b.push_tag_element(hex::encode(second).as_bytes()).unwrap();
        let mut buf = vec![0u8; 4096];
        let size = b.finalize(&mut buf, None).unwrap();
        buf.truncate(size);
        buf
    }

    #[test]
    fn reaction_with_two_e_tags_credits_the_last_one() {
        let db = crate::in_memory().unwrap();
        let store = Store::new(db.clone());

        let first_liked = [6u8; 32];
        let second_liked = [7u8; 32];
        let mut batch = WriteBatch::new();
        batch.push(WriteMessage::WriteNote { bytes: build_reaction_with_two_e_tags(1, first_liked, second_liked) });
        let outcome = store.commit(batch).unwrap();
        assert_eq!(outcome.reactions_applied, 1);

        let rx = db.begin_read().unwrap();
        assert_eq!(meta::read_note_meta(&rx, &second_liked).unwrap().unwrap().reactions, 1);
        assert!(meta::read_note_meta(&rx, &first_liked).unwrap().is_none());
    }
}
