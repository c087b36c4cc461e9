//! Bounded drop-oldest handoff queue.
//!
//! Moves snapshots from the network worker to consumer threads. The worker
//! must never block on a slow consumer, so a full queue evicts its oldest
//! entry instead of waiting. Consumers block (with a timeout) until
//! something arrives.
//!
//! Eviction and insertion happen under the same lock, so a full queue loses
//! exactly one entry per push even with consumers draining concurrently.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Fixed-capacity FIFO with drop-oldest overflow.
///
/// Safe to share between one producer and any number of consumers through
/// an `Arc`. Consumers compete for items: each item is delivered to exactly
/// one `pop` call.
#[derive(Debug)]
pub struct HandoffQueue<T> {
    items: Mutex<VecDeque<T>>,
    ready: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl<T> HandoffQueue<T> {
    /// Creates a queue holding at most `capacity` items (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Appends an item, evicting the oldest one if the queue is full.
    ///
    /// Never blocks on consumers and never fails. Returns the evicted item.
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut items = self.lock();
            let evicted = if items.len() >= self.capacity {
                items.pop_front()
            } else {
                None
            };
            items.push_back(item);
            evicted
        };
        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.ready.notify_one();
        evicted
    }

    /// Removes and returns the oldest item, waiting up to `timeout`.
    ///
    /// `None` or a zero timeout waits indefinitely. Returns `None` if the
    /// timeout elapses with the queue still empty.
    pub fn pop(&self, timeout: Option<Duration>) -> Option<T> {
        let items = self.lock();
        let mut items = match timeout.filter(|t| !t.is_zero()) {
            None => self
                .ready
                .wait_while(items, |q| q.is_empty())
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                self.ready
                    .wait_timeout_while(items, timeout, |q| q.is_empty())
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        items.pop_front()
    }

    /// Removes and returns the oldest item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Removes every queued item, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total items evicted to make room since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    // A panicking consumer can't leave the deque half-modified, so a
    // poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
