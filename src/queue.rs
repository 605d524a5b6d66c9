//! Thread-safe FIFO bridging the accept loop and the worker pool
//!
//! One mutex guards the queue, one condvar carries the "work may be
//! available" signal. A push and its signal happen in the same critical
//! section, so a racing pop either sees the item or gets woken for it.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct ConnQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> ConnQueue<T> {
    pub fn new() -> Self {
        ConnQueue {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Append to the tail and wake one waiter. Items pushed after
    /// `close` are dropped on the floor.
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.items.push_back(item);
        self.available.notify_one();
    }

    /// Non-blocking head removal.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().items.pop_front()
    }

    /// Blocking head removal. Waits on the condvar while the queue is
    /// empty and retries after every wakeup; a signal is a hint, not a
    /// guarantee. Returns `None` only once the queue is closed and
    /// drained.
    pub fn pop_wait(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            if inner.closed {
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Stop accepting new items and release all blocked waiters once
    /// the remaining items are drained.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        self.available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ConnQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
