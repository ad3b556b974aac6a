//! A bounded, mutex+condvar protected queue (§5) — the one suspension
//! point every ingester and the writer block on while idle. Modeled on
//! `examples/original_source/nostrdb/src/protected_queue.h`'s ring buffer,
//! translated into an owning `VecDeque<T>` instead of a raw byte ring:
//! Rust's ownership model already gives us the "single owner at a time"
//! handoff the original gets from `memcpy`-ing into caller-provided memory.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

struct Inner<T> {
    items: VecDeque<T>,
    capacity: usize,
}

/// A bounded FIFO queue, blocking on push and pop (§5's "writer inbox" and
/// "ingester inbox" queue class).
pub struct ProtectedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
}

impl<T> ProtectedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        ProtectedQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                capacity,
            }),
            not_empty: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).capacity
    }

    /// Pushes one item. Returns `false` without pushing if the queue is
    /// full — the caller decides whether to retry or drop.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.items.len() == inner.capacity {
            return false;
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        true
    }

    /// Pushes every item in `items` as one atomic batch, or none at all if
    /// there isn't room for the whole batch (mirrors the original's
    /// all-or-nothing `prot_queue_push_all`).
    pub fn push_all(&self, items: Vec<T>) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.items.len() + items.len() > inner.capacity {
            return false;
        }
        inner.items.extend(items);
        drop(inner);
        self.not_empty.notify_one();
        true
    }

    /// Drains up to `max_items` without blocking; empty if the queue is
    /// empty.
    pub fn try_pop_all(&self, max_items: usize) -> Vec<T> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        drain_up_to(&mut inner.items, max_items)
    }

    /// Blocks until at least one item is available, then drains up to
    /// `max_items` and returns whatever was immediately present.
    pub fn pop_all(&self, max_items: usize) -> Vec<T> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while inner.items.is_empty() {
            inner = self.not_empty.wait(inner).unwrap_or_else(|e| e.into_inner());
        }
        drain_up_to(&mut inner.items, max_items)
    }

    /// Like [`Self::pop_all`], but gives up and returns an empty `Vec` if
    /// nothing arrives within `timeout` — used by `wait_for_notes` so a
    /// caller's blocking wait is still bounded by the process lifetime
    /// rather than a true infinite wait.
    pub fn pop_all_timeout(&self, max_items: usize, timeout: Duration) -> Vec<T> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        while inner.items.is_empty() {
            let (guard, result) = self
                .not_empty
                .wait_timeout(inner, timeout)
                .unwrap_or_else(|e| e.into_inner());
            inner = guard;
            if result.timed_out() {
                break;
            }
        }
        drain_up_to(&mut inner.items, max_items)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn drain_up_to<T>(items: &mut VecDeque<T>, max_items: usize) -> Vec<T> {
    let n = items.len().min(max_items);
    items.drain(..n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_respects_capacity() {
        let q = ProtectedQueue::new(2);
        assert!(q.push(1));
        assert!(q.push(2));
        assert!(!q.push(3));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn push_all_is_all_or_nothing() {
        let q: ProtectedQueue<u32> = ProtectedQueue::new(3);
        assert!(q.push_all(vec![1, 2, 3]));
        assert!(!q.push_all(vec![4]));
        assert_eq!(q.try_pop_all(10), vec![1, 2, 3]);
    }

    #[test]
    fn try_pop_all_on_empty_queue_returns_empty() {
        let q: ProtectedQueue<u32> = ProtectedQueue::new(4);
        assert!(q.try_pop_all(10).is_empty());
    }

    #[test]
    fn pop_all_blocks_until_a_push_wakes_it() {
        let q = Arc::new(ProtectedQueue::new(4));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop_all(10));
        thread::sleep(Duration::from_millis(20));
        q.push(42);
        let popped = handle.join().unwrap();
        assert_eq!(popped, vec![42]);
    }

    #[test]
    fn pop_all_timeout_gives_up_when_nothing_arrives() {
        let q: ProtectedQueue<u32> = ProtectedQueue::new(4);
        let popped = q.pop_all_timeout(10, Duration::from_millis(10));
        assert!(popped.is_empty());
    }
}
