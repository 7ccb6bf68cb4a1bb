//! Fixed-capacity ring of cumulative counters.
//!
//! One slot per sampling tick. Once full, each append evicts the oldest
//! sample, so the ring always covers the last `capacity` ticks. Reads and
//! writes go through one mutex; [`SampleRing::snapshot`] returns head, tail
//! and count from a single acquisition.

use std::sync::{Mutex, MutexGuard};

/// Consistent view of a ring at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingSnapshot {
    /// Newest retained counter.
    pub head: i64,
    /// Oldest retained counter.
    pub tail: i64,
    /// Number of retained samples.
    pub count: usize,
}

impl RingSnapshot {
    /// Increments observed inside the retained window.
    pub fn delta(&self) -> i64 {
        self.head - self.tail
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug)]
struct Inner {
    buffer: Vec<i64>,
    /// Total appends ever made. The logical head cursor is `appended - 1`,
    /// the tail cursor `appended - count`.
    appended: u64,
}

impl Inner {
    fn count(&self) -> usize {
        (self.appended as usize).min(self.buffer.len())
    }

    fn head(&self) -> i64 {
        if self.appended == 0 {
            return 0;
        }
        let cap = self.buffer.len() as u64;
        self.buffer[((self.appended - 1) % cap) as usize]
    }

    fn tail(&self) -> i64 {
        if self.appended == 0 {
            return 0;
        }
        let cap = self.buffer.len() as u64;
        let tail = self.appended - self.count() as u64;
        self.buffer[(tail % cap) as usize]
    }
}

/// Circular buffer of cumulative counters shared between one writer and
/// any number of readers.
#[derive(Debug)]
pub struct SampleRing {
    inner: Mutex<Inner>,
}

impl SampleRing {
    /// Create an empty ring. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                buffer: vec![0; capacity.max(1)],
                appended: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned guard still holds a valid ring: every write is a single
        // slot store followed by a counter bump.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the latest cumulative counter for a tick.
    pub fn append(&self, counter: i64) {
        let mut inner = self.lock();
        let cap = inner.buffer.len() as u64;
        let slot = (inner.appended % cap) as usize;
        inner.buffer[slot] = counter;
        inner.appended += 1;
    }

    pub fn capacity(&self) -> usize {
        self.lock().buffer.len()
    }

    /// Number of samples currently retained.
    pub fn count(&self) -> usize {
        self.lock().count()
    }

    /// True iff nothing has ever been appended.
    pub fn is_empty(&self) -> bool {
        self.lock().appended == 0
    }

    /// Newest retained counter, 0 when empty.
    pub fn head(&self) -> i64 {
        self.lock().head()
    }

    /// Oldest retained counter, 0 when empty.
    pub fn tail(&self) -> i64 {
        self.lock().tail()
    }

    pub fn snapshot(&self) -> RingSnapshot {
        let inner = self.lock();
        RingSnapshot {
            head: inner.head(),
            tail: inner.tail(),
            count: inner.count(),
        }
    }
}
