//! Full-text index write path and the prefix/phrase query algorithm
//! (§4.7). Indexed only for kinds {1, 30023}, alongside `note_blocks`
//! (§4.4 step 5).

use std::collections::HashSet;

use nostrdb_core::keys::TextKey;
use nostrdb_core::note::Note;
use nostrdb_core::text::{prefix_matches, tokenize};
use redb::{ReadTransaction, ReadableTable, WriteTransaction};

use crate::schema::{self, TextDbKey};
use crate::Result;

const EAGER_KINDS: [u32; 2] = [1, 30023];

/// §4.4 step 5's text-index write: one `TextKey` entry per token. Keys
/// that would exceed the 1 KB budget are silently skipped.
pub fn write_note_text(wx: &WriteTransaction, note: &Note<'_>, note_key: u64) -> Result<()> {
    if !EAGER_KINDS.contains(&note.kind()) {
        return Ok(());
    }
    let content = note.content();
    let mut table = wx.open_table(schema::NOTE_TEXT)?;
    for token in tokenize(content.as_bytes()) {
        let key = TextKey {
            note_key,
            word: token.word,
            timestamp: note.created_at(),
            word_index: token.index,
        };
        if key.to_bytes().is_none() {
            continue;
        }
        table.insert(TextDbKey(key), note_key)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy)]
pub struct TextSearchConfig {
    pub order: Order,
    pub limit: usize,
}

impl Default for TextSearchConfig {
    fn default() -> Self {
        TextSearchConfig {
            order: Order::Desc,
            limit: 128,
        }
    }
}

/// One hit from [`search`] (§4.7): seeds ranking in higher layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSearchResult {
    pub note_key: u64,
    pub timestamp: u64,
    pub matched_word_index: u64,
    pub matched_prefix_length: usize,
}

/// The outer/inner-loop prefix/phrase search (§4.7, §8.1 property 11):
/// tokenizes `query` the same way content is tokenized, then for each
/// candidate match of the first token verifies every remaining token
/// also matches some word within the same note.
pub fn search(rx: &ReadTransaction, query: &str, config: TextSearchConfig) -> Result<Vec<TextSearchResult>> {
    let query_tokens = tokenize(query.as_bytes());
    let Some(first_token) = query_tokens.first() else {
        return Ok(Vec::new());
    };
    let table = rx.open_table(schema::NOTE_TEXT)?;

    let mut results = Vec::new();
    let mut seen_notes = HashSet::new();

    match config.order {
        Order::Asc => {
            for entry in table.range(..)? {
                if results.len() >= config.limit {
                    break;
                }
                consider(&table, entry?, &first_token.word, &query_tokens, &mut seen_notes, &mut results)?;
            }
        }
        Order::Desc => {
            for entry in table.range(..)?.rev() {
                if results.len() >= config.limit {
                    break;
                }
                consider(&table, entry?, &first_token.word, &query_tokens, &mut seen_notes, &mut results)?;
            }
        }
    }
    Ok(results)
}

type TextEntry<'a> = (redb::AccessGuard<'a, TextDbKey>, redb::AccessGuard<'a, u64>);

fn consider(
    table: &redb::ReadOnlyTable<TextDbKey, u64>,
    entry: TextEntry<'_>,
    first_query_token: &[u8],
    query_tokens: &[nostrdb_core::text::Token],
    seen_notes: &mut HashSet<u64>,
    results: &mut Vec<TextSearchResult>,
) -> Result<()> {
    let (k, _v) = entry;
    let key = k.value().0;
    let Some(shared) = prefix_matches(first_query_token, &key.word) else {
        return Ok(());
    };
    if !seen_notes.insert(key.note_key) {
        return Ok(());
    }
    for tok in &query_tokens[1..] {
        if !note_has_matching_word(table, key.note_key, &tok.word)? {
            return Ok(());
        }
    }
    results.push(TextSearchResult {
        note_key: key.note_key,
        timestamp: key.timestamp,
        matched_word_index: key.word_index,
        matched_prefix_length: shared,
    });
    Ok(())
}

/// Narrows within one note (§4.7's inner loop): does any word belonging
/// to `note_key` satisfy the prefix rule against `token`?
fn note_has_matching_word(
    table: &redb::ReadOnlyTable<TextDbKey, u64>,
    note_key: u64,
    token: &[u8],
) -> Result<bool> {
    for entry in table.iter()? {
        let (k, _v) = entry?;
        let key = k.value().0;
        if key.note_key == note_key && prefix_matches(token, &key.word).is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostrdb_core::builder::NoteBuilder;

    fn build(id: u8, kind: u32, created_at: u64, content: &str) -> Vec<u8> {
        let mut b = NoteBuilder::new();
        b.set_id([id; 32]).set_pubkey([2u8; 32]).set_sig([0u8; 64]).set_kind(kind).set_created_at(created_at);
        b.set_content(content.as_bytes()).unwrap();
        let mut buf = vec![0u8; 4096];
        let size = b.finalize(&mut buf, None).unwrap();
        buf.truncate(size);
        buf
    }

    #[test]
    fn phrase_search_finds_a_note_with_both_tokens() {
        let db = crate::in_memory().unwrap();
        let bytes = build(1, 1, 100, "we jump over the fence");
        let note = Note::from_bytes(&bytes).unwrap();
        let wx = db.begin_write().unwrap();
        write_note_text(&wx, &note, 5).unwrap();
        wx.commit().unwrap();

        let rx = db.begin_read().unwrap();
        let hits = search(&rx, "Jump Over", TextSearchConfig::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].note_key, 5);
    }

    #[test]
    fn ascending_order_returns_the_oldest_match_first() {
        let db = crate::in_memory().unwrap();
        let wx = db.begin_write().unwrap();
        let old = Note::from_bytes(&build(1, 1, 10, "jump over")).unwrap();
        let new = Note::from_bytes(&build(2, 1, 20, "jump over")).unwrap();
        write_note_text(&wx, &old, 1).unwrap();
        write_note_text(&wx, &new, 2).unwrap();
        wx.commit().unwrap();

        let rx = db.begin_read().unwrap();
        let hits = search(
            &rx,
            "jump over",
            TextSearchConfig { order: Order::Asc, limit: 1 },
        )
        .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].note_key, 1);
    }

    #[test]
    fn non_matching_query_returns_nothing() {
        let db = crate::in_memory().unwrap();
        let bytes = build(1, 1, 1, "hello world");
        let note = Note::from_bytes(&bytes).unwrap();
        let wx = db.begin_write().unwrap();
        write_note_text(&wx, &note, 1).unwrap();
        wx.commit().unwrap();

        let rx = db.begin_read().unwrap();
        let hits = search(&rx, "zzzzz", TextSearchConfig::default()).unwrap();
        assert!(hits.is_empty());
    }
}
