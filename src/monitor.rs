//! Subscriptions and the post-commit fan-out (§4.8).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use nostrdb_core::filter::Filter;
use nostrdb_core::note::Note;

use crate::queue::ProtectedQueue;
use crate::{Error, Result};

pub const MAX_SUBSCRIPTIONS: usize = 32;
pub const MAX_FILTERS: usize = 16;

struct Subscription {
    filters: Vec<Filter>,
    inbox: ProtectedQueue<u64>,
}

/// Live subscriptions and their bounded inboxes. Owned by the `Ndb`
/// facade; the writer thread calls [`Monitor::notify`] once per written
/// note after each successful commit.
pub struct Monitor {
    next_id: AtomicU64,
    subscriptions: Mutex<HashMap<u64, Arc<Subscription>>>,
    inbox_capacity: usize,
}

impl Monitor {
    pub fn new(inbox_capacity: usize) -> Self {
        Monitor {
            next_id: AtomicU64::new(0),
            subscriptions: Mutex::new(HashMap::new()),
            inbox_capacity,
        }
    }

    /// `subscribe(filters) → subid` (§4.8): allocates a slot, capped at
    /// `MAX_SUBSCRIPTIONS`, each with at most `MAX_FILTERS` filters.
    pub fn subscribe(&self, filters: Vec<Filter>) -> Result<u64> {
        if filters.len() > MAX_FILTERS {
            return Err(Error::TooManyFilters);
        }
        let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        if subs.len() >= MAX_SUBSCRIPTIONS {
            return Err(Error::TooManySubscriptions);
        }
        let subid = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        subs.insert(
            subid,
            Arc::new(Subscription { filters, inbox: ProtectedQueue::new(self.inbox_capacity) }),
        );
        Ok(subid)
    }

    pub fn unsubscribe(&self, subid: u64) {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner()).remove(&subid);
    }

    /// `wait_for_notes(subid, buf, cap)` (§4.8): blocks until at least one
    /// note_key is available, then returns whatever is immediately
    /// present (at most `cap`).
    pub fn wait_for_notes(&self, subid: u64, cap: usize) -> Result<Vec<u64>> {
        let sub = self.lookup(subid)?;
        Ok(sub.inbox.pop_all(cap))
    }

    /// Like [`Self::wait_for_notes`], but gives up after `timeout` rather
    /// than blocking forever — useful for callers (and tests) that want a
    /// bounded wait.
    pub fn wait_for_notes_timeout(
        &self,
        subid: u64,
        cap: usize,
        timeout: std::time::Duration,
    ) -> Result<Vec<u64>> {
        let sub = self.lookup(subid)?;
        Ok(sub.inbox.pop_all_timeout(cap, timeout))
    }

    fn lookup(&self, subid: u64) -> Result<Arc<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&subid)
            .cloned()
            .ok_or(Error::UnknownSubscription(subid))
    }

    /// The post-commit fan-out (§4.8): for each live subscription, if any
    /// of its filters matches `note` (same `Filter::matches` the query
    /// executor uses), push `note_key` into that subscription's inbox. A
    /// full inbox just logs and drops the notification — the note itself
    /// is still durably stored.
    pub fn notify(&self, note_key: u64, note: &Note<'_>) {
        let subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        for (&subid, sub) in subs.iter() {
            if sub.filters.iter().any(|f| f.matches(note)) && !sub.inbox.push(note_key) {
                tracing::warn!(subid, note_key, "subscription inbox full, dropping notification");
            }
        }
    }
}
