//! Request sequence numbers.

use std::sync::atomic::{AtomicI64, Ordering};

/// Issues request `seq` values for one session.
///
/// Starts at 1 and never repeats, even when called from several tasks.
#[derive(Debug)]
pub struct SequenceAllocator {
    next: AtomicI64,
}

impl SequenceAllocator {
    /// Create an allocator whose first value is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(1),
        }
    }

    /// Take the next sequence number.
    pub fn next(&self) -> i64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// The value the next call to [`next`](Self::next) will return.
    pub fn peek(&self) -> i64 {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}
