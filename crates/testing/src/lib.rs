//! Event fixtures, a throwaway signer, and `redb` harnesses shared by
//! `nostrdb-store`'s and the root crate's test suites — analogous to
//! `dolos-testing`'s `TestAddress`/fixtures.

use std::sync::Arc;

use nostrdb_core::builder::NoteBuilder;
use nostrdb_core::sign::Keypair;
use redb::Database;

/// A signing identity for fixtures, wrapping [`Keypair`] so tests don't
/// each reach for `secp256k1` directly.
pub struct TestSigner {
    pub keypair: Keypair,
}

impl TestSigner {
    pub fn generate() -> Self {
        TestSigner { keypair: Keypair::generate() }
    }

    /// A deterministic signer for tests that need a stable pubkey across
    /// runs (the all-`byte` secret, repeated 32 times).
    pub fn from_byte(byte: u8) -> Self {
        let secret = [byte.max(1); 32];
        TestSigner {
            keypair: Keypair::from_secret_bytes(&secret).expect("non-zero secret is always valid"),
        }
    }

    pub fn pubkey(&self) -> [u8; 32] {
        self.keypair.public_key_xonly()
    }
}

/// A minimal canned kind-1 text note, signed by `signer`.
pub fn text_note(signer: &TestSigner, created_at: u64, content: &str) -> Vec<u8> {
    build(signer, 1, created_at, content, &[])
}

/// A kind-0 profile note with the given JSON content, signed by `signer`.
pub fn profile_note(signer: &TestSigner, created_at: u64, content_json: &str) -> Vec<u8> {
    build(signer, 0, created_at, content_json, &[])
}

/// A kind-7 reaction targeting `liked_id` via an `e` tag.
pub fn reaction_note(signer: &TestSigner, created_at: u64, liked_id: [u8; 32]) -> Vec<u8> {
    build(signer, 7, created_at, "+", &[vec![b"e".to_vec(), hex::encode(liked_id).into_bytes()]])
}

/// A note with an arbitrary kind/content/tag set, signed by `signer`.
/// `tags` is a list of tags, each a list of elements.
pub fn build(signer: &TestSigner, kind: u32, created_at: u64, content: &str, tags: &[Vec<Vec<u8>>]) -> Vec<u8> {
    let mut b = NoteBuilder::new();
    b.set_pubkey(signer.pubkey()).set_kind(kind).set_created_at(created_at);
    b.set_content(content.as_bytes()).expect("fixture content always fits the cursor");
    for tag in tags {
        b.begin_tag();
        for element in tag {
            b.push_tag_element(element).expect("fixture tag element always fits the cursor");
        }
    }
    let mut buf = vec![0u8; 64 * 1024];
    let size = b.finalize(&mut buf, Some(&signer.keypair)).expect("fixture note always finalizes");
    buf.truncate(size);
    buf
}

/// An in-memory `nostrdb-store` database, schema-initialized and
/// migrated to the latest version — for tests that don't care about
/// persistence.
pub fn in_memory_store() -> Arc<Database> {
    nostrdb_store::in_memory().expect("in-memory redb database always opens")
}

/// An on-disk database rooted in a fresh temp directory. The returned
/// [`tempfile::TempDir`] must be kept alive for as long as `db` is used;
/// dropping it removes the backing files.
pub fn temp_dir_store() -> (Arc<Database>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir creation always succeeds in test environments");
    let path = dir.path().join("nostrdb.redb");
    let db = nostrdb_store::open(&path, None).expect("fresh on-disk database always opens");
    (db, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_note_fixture_round_trips_through_note_from_bytes() {
        let signer = TestSigner::from_byte(1);
        let bytes = text_note(&signer, 100, "hello");
        let note = nostrdb_core::note::Note::from_bytes(&bytes).unwrap();
        assert_eq!(note.kind(), 1);
        assert_eq!(note.created_at(), 100);
        assert_eq!(note.content().as_ref(), "hello");
    }

    #[test]
    fn reaction_note_carries_an_e_tag_pointing_at_the_liked_id() {
        let signer = TestSigner::from_byte(2);
        let liked = [7u8; 32];
        let bytes = reaction_note(&signer, 1, liked);
        let note = nostrdb_core::note::Note::from_bytes(&bytes).unwrap();
        assert_eq!(note.kind(), 7);
        let mut tags = note.tags().into_iter();
        let tag = tags.next().unwrap();
        assert_eq!(note.render_packed(tag.get(0).unwrap()).as_ref(), "e");
    }

    #[test]
    fn in_memory_store_opens_with_the_schema_already_initialized() {
        use redb::ReadableTable;

        let db = in_memory_store();
        let rx = db.begin_read().unwrap();
        let table = rx.open_table(nostrdb_store::schema::NOTES).unwrap();
        assert_eq!(table.len().unwrap(), 0);
    }
}
