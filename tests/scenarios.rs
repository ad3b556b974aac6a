//! End-to-end scenarios driven through the public [`Ndb`] facade: JSON in
//! one side, `query`/`text_search`/`subscribe` out the other. Store-level
//! unit tests already cover the write-path internals in isolation
//! (dedup, replaceable profiles, reaction accumulation); these exercise
//! the whole pipeline the way a real embedder would use it.

use std::time::Duration;

use nostrdb::{Config, FilterBuilder, Ndb};
use nostrdb_core::note::Note;
use nostrdb_store::text_index::TextSearchConfig;
use nostrdb_testing::TestSigner;

fn test_config() -> Config {
    Config { ingester_threads: 2, writer_batch_size: 16, ..Config::default() }
}

/// Polls `f` until it returns `Some`, or panics after a few hundred
/// milliseconds — ingestion is asynchronous (§4.3/§4.4 run on their own
/// threads), so every assertion that depends on a just-ingested event
/// has to tolerate a short, bounded delay instead of racing the writer.
fn poll_until<T>(mut f: impl FnMut() -> Option<T>) -> T {
    for _ in 0..400 {
        if let Some(v) = f() {
            return v;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    panic!("condition never became true within the poll budget");
}

fn client_event_json(note: &Note<'_>) -> String {
    let mut tags = String::new();
    for (i, tag) in note.tags().iter().enumerate() {
        if i > 0 {
            tags.push(',');
        }
        tags.push('[');
        for j in 0..tag.count() {
            if j > 0 {
                tags.push(',');
            }
            let element = tag.get(j).expect("index within tag.count()");
            tags.push('"');
            tags.push_str(&note.render_packed(element));
            tags.push('"');
        }
        tags.push(']');
    }
    format!(
        r#"["EVENT",{{"id":"{}","pubkey":"{}","sig":"{}","kind":{},"created_at":{},"content":{},"tags":[{}]}}]"#,
        hex::encode(note.id()),
        hex::encode(note.pubkey()),
        hex::encode(note.sig()),
        note.kind(),
        note.created_at(),
        serde_json::to_string(note.content().as_ref()).unwrap(),
        tags,
    )
}

/// S1 — basic round-trip: an event with a `p` tag (pointing at an id) and
/// a plain three-element tag survives `ingest_client_event` →
/// `get_note_by_id` with its content and tags intact.
#[test]
fn s1_basic_round_trip() {
    let ndb = Ndb::open_in_memory(&test_config()).unwrap();
    let signer = TestSigner::from_byte(1);
    let pointee = TestSigner::from_byte(2).pubkey();

    let bytes = nostrdb_testing::build(
        &signer,
        1,
        100,
        "hello",
        &[
            vec![b"p".to_vec(), hex::encode(pointee).into_bytes()],
            vec![b"word".to_vec(), b"words".to_vec(), b"w".to_vec()],
        ],
    );
    let built = Note::from_bytes(&bytes).unwrap();
    let id = *built.id();
    let json = client_event_json(&built);

    ndb.ingest_client_event(json.as_bytes());

    let (_, stored) = poll_until(|| ndb.get_note_by_id(&id).unwrap());
    let note = Note::from_bytes(&stored).unwrap();
    assert_eq!(note.content().as_ref(), "hello");

    let tags: Vec<_> = note.tags().iter().collect();
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0].count(), 2);
    assert_eq!(note.render_packed(tags[0].get(0).unwrap()).as_ref(), "p");
    assert_eq!(
        note.render_packed(tags[0].get(1).unwrap()).as_ref(),
        hex::encode(pointee)
    );
    assert_eq!(tags[1].count(), 3);
    assert_eq!(note.render_packed(tags[1].get(2).unwrap()).as_ref(), "w");
}

/// S4 — reaction counter: two distinct kind-7 events with the same last
/// `e` tag bump `note_meta[liked].reactions` to 2 once both land.
#[test]
fn s4_reaction_counter_accumulates_across_distinct_events() {
    let ndb = Ndb::open_in_memory(&test_config()).unwrap();
    let liked_signer = TestSigner::from_byte(10);
    let liked = Note::from_bytes(&nostrdb_testing::text_note(&liked_signer, 1, "liked")).unwrap();
    let liked_id = *liked.id();
    let liked_json = client_event_json(&liked);
    ndb.ingest_client_event(liked_json.as_bytes());
    poll_until(|| ndb.get_note_by_id(&liked_id).unwrap());

    for byte in [11u8, 12u8] {
        let reactor = TestSigner::from_byte(byte);
        let reaction = nostrdb_testing::reaction_note(&reactor, 2, liked_id);
        let note = Note::from_bytes(&reaction).unwrap();
        ndb.ingest_client_event(client_event_json(&note).as_bytes());
    }

    let meta = poll_until(|| {
        let meta = ndb.get_note_meta(&liked_id).ok().flatten()?;
        (meta.reactions == 2).then_some(meta)
    });
    assert_eq!(meta.reactions, 2);
}

/// S5 — filter query: seeding kinds {1, 2, 1337} and querying
/// `{kinds:[1337]}` returns only the kind-1337 notes, newest first.
#[test]
fn s5_filter_query_returns_only_the_requested_kind_newest_first() {
    let ndb = Ndb::open_in_memory(&test_config()).unwrap();
    let signer = TestSigner::from_byte(20);

    for (kind, created_at) in [(1u32, 1u64), (2, 2), (1337, 3), (1337, 4)] {
        let bytes = nostrdb_testing::build(&signer, kind, created_at, "x", &[]);
        let note = Note::from_bytes(&bytes).unwrap();
        ndb.ingest_client_event(client_event_json(&note).as_bytes());
    }

    let mut builder = FilterBuilder::new();
    builder.kinds(vec![1337]).unwrap();
    let filter = builder.close();

    let hits = poll_until(|| {
        let hits = ndb.query(&[filter.clone()], 10).ok()?;
        (hits.len() == 2).then_some(hits)
    });

    for hit in &hits {
        let note = Note::from_bytes(&hit.bytes).unwrap();
        assert_eq!(note.kind(), 1337);
    }
    let first = Note::from_bytes(&hits[0].bytes).unwrap();
    let second = Note::from_bytes(&hits[1].bytes).unwrap();
    assert!(first.created_at() > second.created_at());
}

/// S6 — text search: a note containing "Jump Over" is found by a search
/// for that phrase (case-insensitively, per the tokenizer).
#[test]
fn s6_text_search_finds_a_matching_phrase() {
    let ndb = Ndb::open_in_memory(&test_config()).unwrap();
    let signer = TestSigner::from_byte(30);
    let note = Note::from_bytes(&nostrdb_testing::text_note(&signer, 1, "The fox did Jump Over the fence")).unwrap();
    let id = *note.id();
    ndb.ingest_client_event(client_event_json(&note).as_bytes());
    poll_until(|| ndb.get_note_by_id(&id).unwrap());

    let hits = poll_until(|| {
        let hits = ndb.text_search("Jump Over", TextSearchConfig::default()).ok()?;
        (!hits.is_empty()).then_some(hits)
    });
    assert!(hits.iter().any(|h| h.note_key != 0));
}

/// Property 12 — subscription liveness: a subscription whose filter
/// matches a newly-committed note eventually observes its `note_key`.
#[test]
fn subscription_observes_a_matching_note_after_ingest() {
    let ndb = Ndb::open_in_memory(&test_config()).unwrap();
    let signer = TestSigner::from_byte(40);

    let mut builder = FilterBuilder::new();
    builder.kinds(vec![9999]).unwrap();
    let subid = ndb.subscribe(vec![builder.close()]).unwrap();

    let note = Note::from_bytes(&nostrdb_testing::build(&signer, 9999, 1, "x", &[])).unwrap();
    ndb.ingest_client_event(client_event_json(&note).as_bytes());

    let keys = ndb.wait_for_notes_timeout(subid, 10, Duration::from_secs(2)).unwrap();
    assert!(!keys.is_empty());
}

/// An event whose signature doesn't verify is never committed (§8.1
/// property 2), even though the ingester still parses and classifies it.
#[test]
fn an_invalid_signature_is_never_committed() {
    let ndb = Ndb::open_in_memory(&test_config()).unwrap();
    let signer = TestSigner::from_byte(50);
    let mut bytes = nostrdb_testing::text_note(&signer, 1, "tampered after signing");
    // corrupt the signature bytes (fixed header offset 68..132) so it no
    // longer verifies against the note's id/pubkey.
    let id = *Note::from_bytes(&bytes).unwrap().id();
    const OFF_SIG: usize = 4 + 32 + 32;
    bytes[OFF_SIG] ^= 0xff;

    let note = Note::from_bytes(&bytes).unwrap();
    ndb.ingest_client_event(client_event_json(&note).as_bytes());

    std::thread::sleep(Duration::from_millis(100));
    assert!(ndb.get_note_by_id(&id).unwrap().is_none());
}
