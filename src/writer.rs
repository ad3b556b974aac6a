//! The dedicated writer thread (§4.4, §5): drains its inbox in batches of
//! up to `B` messages, drives [`nostrdb_store::Store`] for the actual
//! commit, and runs the post-commit monitor pass. The transactional
//! per-message logic itself lives in `nostrdb-store`; this module owns
//! the thread, the inbox, and the batching policy around it.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use nostrdb_core::note::Note;
use nostrdb_store::{Store, WriteBatch, WriteMessage};
use redb::{Database, ReadableDatabase};

use crate::monitor::Monitor;
use crate::queue::ProtectedQueue;

const DEFAULT_INBOX_CAPACITY: usize = 16 * 1024;
const BACKOFF: Duration = Duration::from_micros(200);

/// One entry in the writer's inbox: either a transactional message or the
/// `QUIT` control signal (§4.4) that ends the thread.
#[derive(Clone)]
enum Job {
    Message(WriteMessage),
    Quit,
}

/// A cheap-to-clone submission handle, given to every ingester worker and
/// to the `Ndb` facade for direct writes (e.g. `WRITE_DBMETA` during
/// migrations).
#[derive(Clone)]
pub struct WriterHandle {
    inbox: Arc<ProtectedQueue<Job>>,
}

impl WriterHandle {
    /// Enqueues `message`, retrying with a short backoff while the inbox
    /// is full rather than dropping it — unlike a subscription inbox
    /// (§4.8), losing a write silently would violate durability once an
    /// ingester has accepted an event.
    pub fn submit(&self, message: WriteMessage) {
        let job = Job::Message(message);
        while !self.inbox.push(job.clone()) {
            std::thread::sleep(BACKOFF);
        }
    }

    fn quit(&self) {
        while !self.inbox.push(Job::Quit) {
            std::thread::sleep(BACKOFF);
        }
    }
}

/// Owns the writer's OS thread. Dropping this without calling [`Self::join`]
/// leaks the thread (it keeps running until the process exits); `Ndb::close`
/// always joins explicitly.
pub struct WriterThread {
    handle: WriterHandle,
    join: Option<JoinHandle<()>>,
}

impl WriterThread {
    pub fn spawn(db: Arc<Database>, batch_size: usize, monitor: Arc<Monitor>) -> Self {
        let inbox = Arc::new(ProtectedQueue::new(DEFAULT_INBOX_CAPACITY));
        let handle = WriterHandle { inbox: inbox.clone() };
        let join = std::thread::Builder::new()
            .name("nostrdb-writer".into())
            .spawn(move || run(db, inbox, batch_size, monitor))
            .expect("spawning the writer thread should never fail");
        WriterThread { handle, join: Some(join) }
    }

    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    /// Enqueues `QUIT` and blocks until the thread has drained any
    /// previously-queued work and exited (§5's cancellation model).
    pub fn join(mut self) {
        self.handle.quit();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

#[tracing::instrument(skip(db, inbox, monitor))]
fn run(db: Arc<Database>, inbox: Arc<ProtectedQueue<Job>>, batch_size: usize, monitor: Arc<Monitor>) {
    let store = Store::new(db.clone());
    loop {
        let jobs = inbox.pop_all(batch_size);
        let mut batch = WriteBatch::new();
        let mut quit = false;
        for job in jobs {
            match job {
                Job::Message(message) => batch.push(message),
                Job::Quit => quit = true,
            }
        }

        if !batch.is_empty() {
            match store.commit(batch) {
                Ok(outcome) => notify_monitor(&db, &monitor, &outcome.new_note_keys),
                Err(error) => {
                    tracing::warn!(%error, "batch commit failed; discarding the whole batch");
                }
            }
        }

        if quit {
            break;
        }
    }
}

/// Post-commit monitor pass (§4.4, §4.8): re-reads each written note by
/// key (the batch commit only reports keys, not borrowed note views) and
/// runs it past every live subscription.
fn notify_monitor(db: &Database, monitor: &Monitor, note_keys: &[u64]) {
    if note_keys.is_empty() {
        return;
    }
    let rx = match db.begin_read() {
        Ok(rx) => rx,
        Err(error) => {
            tracing::warn!(%error, "could not open a read txn for the post-commit monitor pass");
            return;
        }
    };
    for &note_key in note_keys {
        match nostrdb_store::notes::get_by_key(&rx, note_key) {
            Ok(Some(bytes)) => match Note::from_bytes(&bytes) {
                Ok(note) => monitor.notify(note_key, &note),
                Err(error) => tracing::warn!(%error, note_key, "could not decode a just-written note"),
            },
            Ok(None) => tracing::warn!(note_key, "just-written note_key vanished before the monitor pass"),
            Err(error) => tracing::warn!(%error, note_key, "could not re-read a just-written note"),
        }
    }
}
