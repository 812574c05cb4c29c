// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Queue of synchronous work flushed at the next microtask boundary.

use alloc::collections::VecDeque;

/// FIFO of sync callbacks with a re-entrancy guard.
///
/// Callbacks pushed while a flush is running are picked up by that same
/// flush.
#[derive(Debug)]
pub(crate) struct SyncQueue<T> {
    callbacks: VecDeque<T>,
    is_flushing: bool,
}

impl<T> Default for SyncQueue<T> {
    fn default() -> Self {
        Self {
            callbacks: VecDeque::new(),
            is_flushing: false,
        }
    }
}

impl<T> SyncQueue<T> {
    pub(crate) fn push(&mut self, callback: T) {
        self.callbacks.push_back(callback);
    }

    /// Start a flush. Returns `false` if one is already running.
    pub(crate) fn begin_flush(&mut self) -> bool {
        if self.is_flushing {
            return false;
        }
        self.is_flushing = true;
        true
    }

    pub(crate) fn pop(&mut self) -> Option<T> {
        self.callbacks.pop_front()
    }

    /// End a flush. The flusher drains the queue with [`pop`](Self::pop) first,
    /// so anything still queued arrived after the drain and waits for the next flush.
    pub(crate) fn end_flush(&mut self) {
        self.is_flushing = false;
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    #[test]
    fn reentrant_flush_is_refused() {
        let mut q = SyncQueue::default();
        q.push(1);
        assert!(q.begin_flush());
        assert!(!q.begin_flush());
        let mut seen = Vec::new();
        while let Some(n) = q.pop() {
            if n < 3 {
                q.push(n + 1);
            }
            seen.push(n);
        }
        q.end_flush();
        assert_eq!(seen, [1, 2, 3]);
        assert!(q.is_empty());
        assert!(q.begin_flush());
    }

    #[test]
    fn work_queued_after_a_flush_waits_for_the_next() {
        let mut q = SyncQueue::default();
        assert!(q.begin_flush());
        q.end_flush();
        q.push(7);
        assert!(!q.is_empty());
        assert!(q.begin_flush());
        assert_eq!(q.pop(), Some(7));
        q.end_flush();
        assert!(q.is_empty());
    }
}
