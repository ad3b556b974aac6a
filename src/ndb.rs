//! `Ndb` (§6.2): the public facade wiring `Config`, the writer thread, the
//! ingester pool, the monitor and the underlying `redb::Database` into one
//! handle. Mirrors the shape of `dolos`'s `Domain`/`facade.rs` — a single
//! owned struct a binary opens once and shares behind an `Arc`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nostrdb_core::filter::Filter;
use nostrdb_core::note::Note;
use nostrdb_store::{blocks, meta, notes, profiles, text_index, WriteMessage};
use redb::{Database, ReadableDatabase};

use crate::config::Config;
use crate::ingest::{AcceptAll, IngestFilter, IngesterPool};
use crate::monitor::Monitor;
use crate::query::{self, Hit};
use crate::stats::Stats;
use crate::writer::{WriterHandle, WriterThread};
use crate::{Error, Result};

/// The open database handle (§6.2's top-level object). Owns the writer
/// thread and the ingester pool; dropping it without calling
/// [`Ndb::close`] leaks the writer thread (ingesters are daemon-ish OS
/// threads too, but only the writer holds durability-relevant state in
/// flight).
pub struct Ndb {
    db: Arc<Database>,
    writer: Option<WriterThread>,
    writer_handle: WriterHandle,
    ingesters: Option<IngesterPool>,
    monitor: Arc<Monitor>,
}

impl Ndb {
    /// `ndb_init` / `open` (§6.2): opens (or creates) the database at
    /// `config.data_dir/nostrdb.redb`, runs pending migrations unless
    /// `config.no_migrate` is set, and spawns the writer thread and
    /// ingester pool.
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_with_filter(config, Box::new(AcceptAll))
    }

    /// Like [`Self::open`], but with a caller-supplied [`IngestFilter`]
    /// (§4.3 step 5, §6.2's `ingest_filter_hook`/`filter_ctx`).
    pub fn open_with_filter(config: &Config, filter: Box<dyn IngestFilter>) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db_path = config.data_dir.join("nostrdb.redb");

        let db = if config.no_migrate {
            open_without_migrating(&db_path, config.map_size)?
        } else {
            nostrdb_store::open(&db_path, Some(cache_size_mb(config.map_size)))?
        };

        let monitor = Arc::new(Monitor::new(config.max_subscriptions.max(1) * 64));
        let writer = WriterThread::spawn(db.clone(), config.writer_batch_size, monitor.clone());
        let writer_handle = writer.handle();
        let ingesters = IngesterPool::spawn(
            config.ingester_threads,
            db.clone(),
            writer_handle.clone(),
            filter,
            config.skip_verification,
        );

        Ok(Ndb { db, writer: Some(writer), writer_handle, ingesters: Some(ingesters), monitor })
    }

    /// An in-process database with no backing file, for embedding tests
    /// and short-lived tools.
    pub fn open_in_memory(config: &Config) -> Result<Self> {
        let db = nostrdb_store::in_memory()?;
        let monitor = Arc::new(Monitor::new(config.max_subscriptions.max(1) * 64));
        let writer = WriterThread::spawn(db.clone(), config.writer_batch_size, monitor.clone());
        let writer_handle = writer.handle();
        let ingesters = IngesterPool::spawn(
            config.ingester_threads,
            db.clone(),
            writer_handle.clone(),
            Box::new(AcceptAll),
            config.skip_verification,
        );
        Ok(Ndb { db, writer: Some(writer), writer_handle, ingesters: Some(ingesters), monitor })
    }

    /// `close` (§6.2): stops accepting new ingest work, drains and joins
    /// the ingester pool, then drains and joins the writer — in that
    /// order, so nothing the ingesters already accepted is lost.
    pub fn close(&mut self) {
        if let Some(ingesters) = self.ingesters.take() {
            ingesters.join();
        }
        if let Some(writer) = self.writer.take() {
            writer.join();
        }
    }

    /// `ingest_event(json)` (§6.2): relay-framed or bare event JSON.
    pub fn ingest_event(&self, json: &[u8]) {
        self.ingesters().ingest(json);
    }

    /// `ingest_client_event(json)` (§6.2): client-framed `["EVENT", {...}]`.
    pub fn ingest_client_event(&self, json: &[u8]) {
        self.ingesters().ingest_client_event(json);
    }

    /// `ingest_stream(reader)` (§6.2): one call to [`Self::ingest_event`]
    /// per newline-delimited line.
    pub fn ingest_stream<R: std::io::BufRead>(&self, reader: R) -> std::io::Result<()> {
        self.ingesters().ingest_stream(reader)
    }

    fn ingesters(&self) -> &IngesterPool {
        self.ingesters.as_ref().expect("ingest called after close")
    }


    /// `query(filters, limit)` (§6.2, §4.5).
    pub fn query(&self, filters: &[Filter], limit: usize) -> Result<Vec<Hit>> {
        let rx = self.db.begin_read()?;
        Ok(query::query(&rx, filters, limit)?)
    }

    /// `text_search(query, config)` (§6.2, §4.7).
    pub fn text_search(&self, search_query: &str, config: text_index::TextSearchConfig) -> Result<Vec<Hit>> {
        let rx = self.db.begin_read()?;
        Ok(query::text_search(&rx, search_query, config)?)
    }

    pub fn get_note_by_id(&self, id: &[u8; 32]) -> Result<Option<(u64, Vec<u8>)>> {
        let rx = self.db.begin_read()?;
        Ok(notes::get_by_id(&rx, id)?)
    }

    pub fn get_note_by_key(&self, note_key: u64) -> Result<Option<Vec<u8>>> {
        let rx = self.db.begin_read()?;
        Ok(notes::get_by_key(&rx, note_key)?)
    }

    pub fn get_profile_by_pubkey(&self, pubkey: &[u8; 32]) -> Result<Option<profiles::ProfileRecord>> {
        let rx = self.db.begin_read()?;
        Ok(profiles::get_by_pubkey(&rx, pubkey)?)
    }

    pub fn get_profile_by_key(&self, profile_key: u64) -> Result<Option<profiles::ProfileRecord>> {
        let rx = self.db.begin_read()?;
        Ok(profiles::get_by_key(&rx, profile_key)?)
    }

    pub fn get_note_meta(&self, id: &[u8; 32]) -> Result<Option<meta::NoteMeta>> {
        let rx = self.db.begin_read()?;
        Ok(meta::read_note_meta(&rx, id)?)
    }

    pub fn read_last_profile_fetch(&self, pubkey: &[u8; 32]) -> Result<Option<u64>> {
        let rx = self.db.begin_read()?;
        Ok(profiles::read_last_fetch(&rx, pubkey)?)
    }

    /// `get_blocks_by_key` (§6.2): returns the cached parse, computing and
    /// caching it on first read if the note's kind wasn't eagerly parsed.
    pub fn get_blocks_by_key(&self, note_key: u64) -> Result<nostrdb_core::blocks::NoteBlocks> {
        let bytes = self.get_note_by_key(note_key)?.ok_or(Error::NoteNotFound(note_key))?;
        let note = Note::from_bytes(&bytes)?;
        Ok(blocks::get_or_compute(&self.db, note_key, &note.content())?)
    }

    /// `stats()` (§6.2).
    pub fn stats(&self) -> Result<Stats> {
        Ok(crate::stats::compute(&self.db)?)
    }

    /// `subscribe(filters)` (§4.8, §6.2).
    pub fn subscribe(&self, filters: Vec<Filter>) -> Result<u64> {
        self.monitor.subscribe(filters)
    }

    pub fn unsubscribe(&self, subid: u64) {
        self.monitor.unsubscribe(subid);
    }

    /// `wait_for_notes(subid, cap)` (§4.8, §6.2): blocks until at least
    /// one note_key arrives.
    pub fn wait_for_notes(&self, subid: u64, cap: usize) -> Result<Vec<u64>> {
        self.monitor.wait_for_notes(subid, cap)
    }

    pub fn wait_for_notes_timeout(&self, subid: u64, cap: usize, timeout: Duration) -> Result<Vec<u64>> {
        self.monitor.wait_for_notes_timeout(subid, cap, timeout)
    }

    /// A direct write bypassing the ingest pipeline (parse/verify) —
    /// used by tools that already hold a packed note, e.g. the CLI's
    /// `import` subcommand replaying a dump.
    pub fn write_note_bytes(&self, bytes: Vec<u8>) {
        self.writer_handle.submit(WriteMessage::WriteNote { bytes });
    }
}

impl Drop for Ndb {
    fn drop(&mut self) {
        self.close();
    }
}

fn cache_size_mb(map_size: u64) -> usize {
    ((map_size / (1024 * 1024)).max(1)) as usize
}

fn open_without_migrating(path: &Path, map_size: u64) -> Result<Arc<Database>> {
    let db = Database::builder()
        .set_cache_size(1024 * 1024 * cache_size_mb(map_size))
        .create(path)
        .map_err(nostrdb_store::Error::from)?;
    Ok(Arc::new(db))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostrdb_testing::TestSigner;

    fn test_config() -> Config {
        Config { ingester_threads: 1, writer_batch_size: 16, ..Config::default() }
    }

    #[test]
    fn ingesting_a_well_formed_event_makes_it_queryable() {
        let ndb = Ndb::open_in_memory(&test_config()).unwrap();
        let signer = TestSigner::from_byte(1);
        let note = Note::from_bytes(&nostrdb_testing::text_note(&signer, 1, "hi")).unwrap();
        let json = format!(
            r#"["EVENT",{{"id":"{}","pubkey":"{}","sig":"{}","kind":1,"created_at":1,"content":"hi","tags":[]}}]"#,
            hex::encode(note.id()),
            hex::encode(note.pubkey()),
            hex::encode(note.sig()),
        );
        let id = *note.id();

        ndb.ingest_client_event(json.as_bytes());

        // the ingester pool and writer thread are asynchronous; give them a
        // moment before asserting, the way a real client would retry a query.
        let mut found = None;
        for _ in 0..200 {
            if let Some(hit) = ndb.get_note_by_id(&id).unwrap() {
                found = Some(hit);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(found.is_some());
    }

    #[test]
    fn stats_reports_a_fresh_database_as_empty() {
        let ndb = Ndb::open_in_memory(&test_config()).unwrap();
        let stats = ndb.stats().unwrap();
        assert_eq!(stats.other_kinds, 0);
    }
}
