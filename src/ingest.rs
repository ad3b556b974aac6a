//! The ingester worker pool (§4.3): a fixed set of symmetric OS threads,
//! each with its own bounded inbox, running the seven-step per-event
//! pipeline before handing the packed note off to the writer.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{SystemTime, UNIX_EPOCH};

use nostrdb_core::note::Note;
use nostrdb_core::parse::{parse_event_json, ParsedEvent};
use nostrdb_core::sign::{Secp256k1Verifier, SignatureVerifier};
use nostrdb_store::{notes, schema, WriteMessage};
use redb::{Database, ReadableDatabase};

use crate::queue::ProtectedQueue;
use crate::writer::WriterHandle;

const DEFAULT_INBOX_CAPACITY: usize = 4096;

/// Verdict returned by an [`IngestFilter`] (§4.3 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    SkipSignatureVerification,
    Reject,
}

/// The ingest-filter hook (§4.3, §9's only polymorphism besides the key
/// comparators): one method, consulted after parsing and before
/// verification.
pub trait IngestFilter: Send + Sync {
    fn filter(&self, event: &ParsedEvent) -> Verdict;
}

/// The default hook: accept everything, verify everything.
pub struct AcceptAll;

impl IngestFilter for AcceptAll {
    fn filter(&self, _event: &ParsedEvent) -> Verdict {
        Verdict::Accept
    }
}

struct Context {
    db: Arc<Database>,
    writer: WriterHandle,
    verifier: Box<dyn SignatureVerifier>,
    filter: Box<dyn IngestFilter>,
    skip_verification: bool,
}

enum Job {
    Event(Vec<u8>),
    Quit,
}

/// A fixed pool of ingester workers (§4.3's "Scheduling"). The public
/// [`IngesterPool::ingest`]/[`IngesterPool::ingest_client_event`] copy the
/// caller's JSON into a heap buffer and dispatch round-robin to the next
/// worker's inbox.
pub struct IngesterPool {
    inboxes: Vec<Arc<ProtectedQueue<Job>>>,
    next: AtomicUsize,
    handles: Vec<JoinHandle<()>>,
}

impl IngesterPool {
    pub fn spawn(
        threads: u32,
        db: Arc<Database>,
        writer: WriterHandle,
        filter: Box<dyn IngestFilter>,
        skip_verification: bool,
    ) -> Self {
        let threads = threads.max(1);
        let ctx = Arc::new(Context {
            db,
            writer,
            verifier: Box::new(Secp256k1Verifier),
            filter,
            skip_verification,
        });

        let mut inboxes = Vec::with_capacity(threads as usize);
        let mut handles = Vec::with_capacity(threads as usize);
        for i in 0..threads {
            let inbox = Arc::new(ProtectedQueue::new(DEFAULT_INBOX_CAPACITY));
            let worker_inbox = inbox.clone();
            let worker_ctx = ctx.clone();
            let handle = std::thread::Builder::new()
                .name(format!("nostrdb-ingester-{i}"))
                .spawn(move || worker_loop(worker_inbox, worker_ctx))
                .expect("spawning an ingester thread should never fail");
            inboxes.push(inbox);
            handles.push(handle);
        }

        IngesterPool { inboxes, next: AtomicUsize::new(0), handles }
    }

    /// `ingest_event(json, len)` (§6.2): auto-detects client vs relay
    /// framing and drops relay control frames (`EOSE`/`OK`) at dispatch
    /// time rather than burning a worker slot on them.
    pub fn ingest(&self, json: &[u8]) {
        self.dispatch(json.to_vec());
    }

    /// `ingest_client_event(json, len)` (§6.2): identical dispatch; the
    /// framing distinction only matters inside [`worker_loop`]'s
    /// classification step, which handles both shapes uniformly.
    pub fn ingest_client_event(&self, json: &[u8]) {
        self.dispatch(json.to_vec());
    }

    /// `ingest_stream(reader)` (§6.2): one call to [`Self::ingest`] per
    /// newline-delimited line.
    pub fn ingest_stream<R: std::io::BufRead>(&self, reader: R) -> std::io::Result<()> {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            self.ingest(line.as_bytes());
        }
        Ok(())
    }

    fn dispatch(&self, bytes: Vec<u8>) {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.inboxes.len();
        if !self.inboxes[i].push(Job::Event(bytes)) {
            tracing::warn!(worker = i, "ingester inbox full, dropping event");
        }
    }

    /// Enqueues `QUIT` on every worker and joins them (§5's cancellation
    /// model): each worker drains whatever was already queued, then exits.
    pub fn join(mut self) {
        for inbox in &self.inboxes {
            let mut pushed = inbox.push(Job::Quit);
            while !pushed {
                std::thread::sleep(std::time::Duration::from_micros(200));
                pushed = inbox.push(Job::Quit);
            }
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(inbox: Arc<ProtectedQueue<Job>>, ctx: Arc<Context>) {
    loop {
        let jobs = inbox.pop_all(64);
        let mut quit = false;
        for job in jobs {
            match job {
                Job::Event(bytes) => process_event(&ctx, &bytes),
                Job::Quit => quit = true,
            }
        }
        if quit {
            break;
        }
    }
}

/// One of the three outer-frame shapes the ingester recognizes (§4.3
/// step 4). `EOSE`/`OK` are relay control frames: recognized so they
/// don't fall through to the parser as malformed JSON, but otherwise
/// dropped — only `EVENT` proceeds.
enum Frame<'a> {
    ClientEvent(&'a [u8]),
    RelayEvent(&'a [u8]),
    RelayControl,
}

/// Splits a top-level JSON array into its element byte spans, honoring
/// string literals and nested `[]`/`{}` so a comma or bracket inside a
/// quoted string or a nested structure is not mistaken for a top-level
/// delimiter.
fn array_elements(json: &[u8]) -> Option<Vec<&[u8]>> {
    let n = json.len();
    let mut i = 0;
    while i < n && json[i].is_ascii_whitespace() {
        i += 1;
    }
    if i >= n || json[i] != b'[' {
        return None;
    }
    i += 1;

    let mut elems = Vec::new();
    loop {
        while i < n && json[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= n {
            return None;
        }
        if json[i] == b']' {
            i += 1;
            break;
        }

        let start = i;
        let mut depth = 0i32;
        let mut in_string = false;
        let mut escape = false;
        loop {
            if i >= n {
                return None;
            }
            let b = json[i];
            if in_string {
                if escape {
                    escape = false;
                } else if b == b'\\' {
                    escape = true;
                } else if b == b'"' {
                    in_string = false;
                }
            } else {
                match b {
                    b'"' => in_string = true,
                    b'[' | b'{' => depth += 1,
                    b']' | b'}' => {
                        if depth == 0 {
                            break;
                        }
                        depth -= 1;
                    }
                    b',' if depth == 0 => break,
                    _ => {}
                }
            }
            i += 1;
        }
        elems.push(&json[start..i]);

        while i < n && json[i].is_ascii_whitespace() {
            i += 1;
        }
        match json.get(i) {
            Some(b',') => i += 1,
            Some(b']') => {
                i += 1;
                break;
            }
            _ => return None,
        }
    }
    Some(elems)
}

fn classify_frame(json: &[u8]) -> Option<Frame<'_>> {
    let elems = array_elements(json)?;
    let tag = elems.first()?;
    match (unquote(tag)?, elems.len()) {
        ("EVENT", 2) => Some(Frame::ClientEvent(elems[1])),
        ("EVENT", 3) => Some(Frame::RelayEvent(elems[2])),
        ("EOSE", _) | ("OK", _) => Some(Frame::RelayControl),
        _ => None,
    }
}

fn unquote(bytes: &[u8]) -> Option<&str> {
    let s = std::str::from_utf8(bytes).ok()?.trim();
    s.strip_prefix('"')?.strip_suffix('"')
}

/// The per-event pipeline (§4.3): dedup probe, parse, framing
/// classification, filter hook, signature verification, message
/// construction and handoff to the writer.
#[tracing::instrument(skip(ctx, json))]
fn process_event(ctx: &Context, json: &[u8]) {
    let object_bytes = match classify_frame(json) {
        Some(Frame::ClientEvent(obj)) | Some(Frame::RelayEvent(obj)) => obj,
        Some(Frame::RelayControl) | None => return,
    };

    let rx = match ctx.db.begin_read() {
        Ok(rx) => rx,
        Err(error) => {
            tracing::warn!(%error, "could not open a read txn for the dedup probe");
            return;
        }
    };
    let note_id_table = match rx.open_table(schema::NOTE_ID) {
        Ok(table) => table,
        Err(error) => {
            tracing::warn!(%error, "could not open note_id for the dedup probe");
            return;
        }
    };

    let mut already_have = false;
    let mut on_id = |hex_id: &str| -> ControlFlow<()> {
        let mut id = [0u8; 32];
        if hex::decode_to_slice(hex_id.as_bytes(), &mut id).is_ok() {
            if let Ok(true) = notes::id_exists(&note_id_table, &id) {
                already_have = true;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    };
    let parsed = parse_event_json(object_bytes, Some(&mut on_id));
    drop(note_id_table);
    drop(rx);

    let parsed = match parsed {
        Ok(parsed) => parsed,
        Err(_) if already_have => return, // already-have sentinel (§4.3 step 2)
        Err(error) => {
            tracing::debug!(%error, "dropping event: parse failed");
            return;
        }
    };

    let verdict = ctx.filter.filter(&parsed);
    if verdict == Verdict::Reject {
        return;
    }

    let skip_verify = ctx.skip_verification || verdict == Verdict::SkipSignatureVerification;
    if !skip_verify && !ctx.verifier.verify(&parsed.id, &parsed.pubkey, &parsed.sig) {
        tracing::debug!("dropping event: invalid signature");
        return;
    }

    let kind = parsed.kind;
    let builder = match parsed.into_builder() {
        Ok(builder) => builder,
        Err(error) => {
            tracing::debug!(%error, "dropping event: could not build a packed note");
            return;
        }
    };

    let mut buf = vec![0u8; std::cmp::max(8 * json.len(), 4096)];
    let mut builder = builder;
    let size = match builder.finalize(&mut buf, None) {
        Ok(size) => size,
        Err(error) => {
            tracing::debug!(%error, "dropping event: packed note did not fit its buffer");
            return;
        }
    };
    buf.truncate(size);
    if Note::from_bytes(&buf).is_err() {
        tracing::debug!("dropping event: packed note failed to re-parse");
        return;
    }

    let message = if kind == 0 {
        let fetched_at = unix_now();
        WriteMessage::WriteProfile { bytes: buf, fetched_at }
    } else {
        WriteMessage::WriteNote { bytes: buf }
    };
    ctx.writer.submit(message);
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
