// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Unbounded concurrent FIFO shared by a sink and its workers.
//!
//! Besides push/try-pop the queue carries two wake-up signals:
//!
//! - **item available**: one waiter is woken per pushed item, so idle
//!   workers do not have to poll.
//! - **drained**: every waiter is woken whenever a pop empties the queue,
//!   which is what `complete()` waits on instead of sleeping in a loop.
//!
//! # Example
//!
//! ```
//! use ingest_sinks::SinkQueue;
//!
//! let queue = SinkQueue::new();
//! queue.push("a");
//! queue.push("b");
//! assert_eq!(queue.len(), 2);
//! assert_eq!(queue.try_pop(), Some("a"));
//! assert_eq!(queue.pop_up_to(10), vec!["b"]);
//! assert!(queue.is_empty());
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

pub struct SinkQueue<T> {
    items: Mutex<VecDeque<T>>,
    /// Mirrors `items.len()` so `len()` never takes the lock.
    len: AtomicUsize,
    available: Notify,
    drained: Notify,
}

impl<T> SinkQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    /// Append an item; never blocks on backlog.
    pub fn push(&self, item: T) -> usize {
        let len = {
            let mut items = self.items.lock();
            items.push_back(item);
            let len = items.len();
            self.len.store(len, Ordering::Release);
            len
        };
        self.available.notify_one();
        len
    }

    /// Non-blocking dequeue of the oldest item.
    pub fn try_pop(&self) -> Option<T> {
        let (item, now_empty) = {
            let mut items = self.items.lock();
            let item = items.pop_front();
            self.len.store(items.len(), Ordering::Release);
            (item, items.is_empty())
        };
        if item.is_some() && now_empty {
            self.drained.notify_waiters();
        }
        item
    }

    /// Dequeue up to `max` items in FIFO order as one owned batch.
    pub fn pop_up_to(&self, max: usize) -> Vec<T> {
        let (batch, now_empty) = {
            let mut items = self.items.lock();
            let take = max.min(items.len());
            let batch: Vec<T> = items.drain(..take).collect();
            self.len.store(items.len(), Ordering::Release);
            (batch, items.is_empty())
        };
        if !batch.is_empty() && now_empty {
            self.drained.notify_waiters();
        }
        batch
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Emptiness check that takes the queue lock, so it is ordered against
    /// every push that completed before it. `is_empty` reads the mirrored
    /// length and is not.
    #[must_use]
    pub fn is_empty_locked(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Wait until an item may be available.
    ///
    /// Wake-ups are hints: the caller must still `try_pop` and may find the
    /// queue empty again.
    pub async fn item_available(&self) {
        self.available.notified().await;
    }

    /// Resolve once the queue is observed empty.
    ///
    /// Only meaningful once producers have stopped; until then the queue can
    /// refill right after this returns.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a pop racing with the check
            // cannot slip its notification in between.
            notified.as_mut().enable();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl<T> Default for SinkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for SinkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkQueue").field("len", &self.len()).finish()
    }
}
