//! The root crate's query executor (§4.5): merges `nostrdb-store`'s
//! per-plan cursor walks with note-byte fetches and the rest of each
//! [`Filter`]'s predicate, then sorts and truncates the combined result
//! across a compound (multi-filter) query.
//!
//! The planner itself (picking [`Plan`] from a [`Filter`]'s shape) lives
//! in `nostrdb-core`; the index walks live in `nostrdb-store::query`.
//! This module is the layer that owns note bytes and cross-filter
//! merging, which neither of those crates has a reason to know about.

use std::collections::HashSet;

use nostrdb_core::filter::{Filter, Plan};
use nostrdb_core::note::Note;
use nostrdb_store::{notes, query as store_query, text_index, Result as StoreResult};
use redb::ReadTransaction;

/// How many index-walk candidates to pull per sub-scan before
/// re-filtering and re-sorting, relative to a filter's own `limit`. Index
/// walks only guarantee order on the one field they're keyed by, so a
/// filter with other fields set (kinds + a tag, say) needs slack to
/// still find `limit` matches after the rest of [`Filter::matches`] is
/// applied.
const OVERSAMPLE: usize = 4;
const DEFAULT_LIMIT: usize = 256;
const MAX_CANDIDATES_PER_SCAN: usize = 10_000;

/// One row of a query result: the `note_key` plus its packed bytes, so
/// callers don't need a second read to get at the note they just
/// matched.
#[derive(Debug, Clone)]
pub struct Hit {
    pub note_key: u64,
    pub bytes: Vec<u8>,
}

/// Runs a compound query (§4.5): each filter gets up to its own `limit`
/// (bounded by whatever capacity remains in `total_cap`), results are
/// concatenated and deduplicated by `note_key`, then the whole set is
/// sorted `(-created_at, id)` and truncated to `total_cap`.
pub fn query(rx: &ReadTransaction, filters: &[Filter], total_cap: usize) -> StoreResult<Vec<Hit>> {
    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    for filter in filters {
        if hits.len() >= total_cap {
            break;
        }
        let remaining = total_cap - hits.len();
        let per_filter_cap = filter
            .limit
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_LIMIT)
            .min(remaining);
        if per_filter_cap == 0 {
            continue;
        }

        for (note_key, bytes) in run_one(rx, filter, per_filter_cap)? {
            if seen.insert(note_key) {
                hits.push(Hit { note_key, bytes });
            }
        }
    }

    hits.sort_unstable_by(|a, b| {
        let na = Note::from_bytes(&a.bytes);
        let nb = Note::from_bytes(&b.bytes);
        match (na, nb) {
            (Ok(na), Ok(nb)) => nb
                .created_at()
                .cmp(&na.created_at())
                .then_with(|| na.id().cmp(nb.id())),
            _ => std::cmp::Ordering::Equal,
        }
    });
    hits.truncate(total_cap);
    Ok(hits)
}

fn run_one(rx: &ReadTransaction, filter: &Filter, cap: usize) -> StoreResult<Vec<(u64, Vec<u8>)>> {
    let scan_cap = (cap * OVERSAMPLE).min(MAX_CANDIDATES_PER_SCAN);
    let candidates = plan_candidates(rx, filter, scan_cap)?;

    let mut out = Vec::new();
    for note_key in candidates {
        let Some(bytes) = notes::get_by_key(rx, note_key)? else {
            continue;
        };
        let Ok(note) = Note::from_bytes(&bytes) else {
            continue;
        };
        if filter.matches(&note) {
            out.push((note_key, bytes));
            if out.len() >= cap {
                break;
            }
        }
    }
    Ok(out)
}

/// Walks the one index [`Filter::plan`] selects, merging across every
/// value in a multi-valued field (several ids, several kinds, ...) since
/// the store-crate scans only take one value at a time.
fn plan_candidates(rx: &ReadTransaction, filter: &Filter, cap: usize) -> StoreResult<Vec<u64>> {
    match filter.plan() {
        Plan::Ids => {
            let mut out = Vec::new();
            for id in filter.ids.as_deref().unwrap_or(&[]) {
                if let Some(key) = store_query::scan_id(rx, id, filter.until)? {
                    out.push(key);
                }
            }
            Ok(out)
        }
        Plan::Tags => {
            let mut out = Vec::new();
            let Some(tag_filter) = filter.tags.first() else {
                return Ok(out);
            };
            for value in &tag_filter.values {
                out.extend(store_query::scan_tag(
                    rx,
                    tag_filter.label as u8,
                    value,
                    filter.until,
                    cap,
                )?);
            }
            Ok(out)
        }
        Plan::Authors => {
            let mut out = Vec::new();
            for author in filter.authors.as_deref().unwrap_or(&[]) {
                out.extend(store_query::scan_author(rx, author, filter.until, cap)?);
            }
            Ok(out)
        }
        Plan::Kinds => {
            let mut out = Vec::new();
            for kind in filter.kinds.as_deref().unwrap_or(&[]) {
                out.extend(store_query::scan_kind(rx, *kind, filter.until, cap)?);
            }
            Ok(out)
        }
        Plan::Created => store_query::scan_created(rx, filter.until, cap),
    }
}

/// `text_search(query)` (§6.2, §4.7): a thin pass-through to
/// `nostrdb-store`'s prefix/phrase search, attaching note bytes the same
/// way [`query`] does.
pub fn text_search(
    rx: &ReadTransaction,
    search_query: &str,
    config: text_index::TextSearchConfig,
) -> StoreResult<Vec<Hit>> {
    let results = text_index::search(rx, search_query, config)?;
    let mut out = Vec::with_capacity(results.len());
    for result in results {
        if let Some(bytes) = notes::get_by_key(rx, result.note_key)? {
            out.push(Hit { note_key: result.note_key, bytes });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostrdb_core::FilterBuilder;
    use nostrdb_testing::{text_note, TestSigner};

    fn written(db: &redb::Database, notes: &[Vec<u8>]) {
        let wx = db.begin_write().unwrap();
        for bytes in notes {
            let note = Note::from_bytes(bytes).unwrap();
            nostrdb_store::notes::write_note(&wx, &note).unwrap();
        }
        wx.commit().unwrap();
    }

    #[test]
    fn a_kinds_filter_returns_newest_first() {
        let db = nostrdb_store::in_memory().unwrap();
        let signer = TestSigner::from_byte(1);
        written(&db, &[text_note(&signer, 100, "a"), text_note(&signer, 300, "b")]);

        let mut b = FilterBuilder::new();
        b.kinds(vec![1]).unwrap();
        let rx = db.begin_read().unwrap();
        let hits = query(&rx, &[b.close()], 10).unwrap();
        assert_eq!(hits.len(), 2);
        let first = Note::from_bytes(&hits[0].bytes).unwrap();
        assert_eq!(first.created_at(), 300);
    }

    #[test]
    fn compound_query_concatenates_and_dedups_across_filters() {
        let db = nostrdb_store::in_memory().unwrap();
        let signer = TestSigner::from_byte(2);
        written(&db, &[text_note(&signer, 1, "x")]);

        let mut b1 = FilterBuilder::new();
        b1.kinds(vec![1]).unwrap();
        let mut b2 = FilterBuilder::new();
        b2.kinds(vec![1]).unwrap();

        let rx = db.begin_read().unwrap();
        let hits = query(&rx, &[b1.close(), b2.close()], 10).unwrap();
        assert_eq!(hits.len(), 1); // same note matched both filters, deduped
    }

    #[test]
    fn total_cap_is_respected_across_filters() {
        let db = nostrdb_store::in_memory().unwrap();
        let signer = TestSigner::from_byte(3);
        written(
            &db,
            &[
                text_note(&signer, 1, "a"),
                text_note(&signer, 2, "b"),
                text_note(&signer, 3, "c"),
            ],
        );

        let mut b = FilterBuilder::new();
        b.kinds(vec![1]).unwrap();
        let rx = db.begin_read().unwrap();
        let hits = query(&rx, &[b.close()], 2).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn text_search_attaches_note_bytes() {
        let db = nostrdb_store::in_memory().unwrap();
        let signer = TestSigner::from_byte(4);
        let bytes = text_note(&signer, 1, "jump over the fence");
        written(&db, &[bytes]);

        let rx = db.begin_read().unwrap();
        let hits = text_search(&rx, "jump over", text_index::TextSearchConfig::default()).unwrap();
        assert_eq!(hits.len(), 1);
        let note = Note::from_bytes(&hits[0].bytes).unwrap();
        assert_eq!(note.content().as_ref(), "jump over the fence");
    }
}
