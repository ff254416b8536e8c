//! Bounded hand-off queue between vote arrival and the producer tick.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::vote::Vote;

/// Default number of votes held between producer ticks.
pub const DEFAULT_CAPACITY: usize = 2048;

/// Buffer of votes awaiting the next producer tick.
pub type VoteBuffer = BoundedBuffer<Vote>;

/// Fixed-capacity FIFO of pending items.
///
/// `offer` never blocks and never evicts: once full, new items are refused
/// until the next `drain_all`. The lock is only held for the duration of a
/// push or a swap, so arrivals on other threads are never stalled by a
/// publish in progress.
#[derive(Debug)]
pub struct BoundedBuffer<T> {
    capacity: usize,
    queue: Mutex<VecDeque<T>>,
}

impl<T> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an item. Returns `false`, leaving the buffer untouched, if full.
    pub fn offer(&self, item: T) -> bool {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            return false;
        }
        queue.push_back(item);
        true
    }

    /// Remove and return everything queued, oldest first.
    pub fn drain_all(&self) -> Vec<T> {
        let mut queue = self.lock();
        if queue.is_empty() {
            return Vec::new();
        }
        let drained = std::mem::replace(&mut *queue, VecDeque::with_capacity(self.capacity));
        drained.into()
    }

    /// Discard everything queued.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the deque half-mutated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for BoundedBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_offer_up_to_capacity_then_refuse() {
        let buffer = BoundedBuffer::new(3);
        assert!(buffer.offer(1));
        assert!(buffer.offer(2));
        assert!(buffer.offer(3));

        assert!(!buffer.offer(4));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.drain_all(), vec![1, 2, 3]);
    }

    #[test]
    fn test_default_capacity() {
        let buffer: BoundedBuffer<u32> = BoundedBuffer::default();
        assert_eq!(buffer.capacity(), 2048);
        for i in 0..2048 {
            assert!(buffer.offer(i));
        }
        assert!(!buffer.offer(2048));
        assert_eq!(buffer.drain_all(), (0..2048).collect::<Vec<_>>());
    }

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let buffer = BoundedBuffer::new(8);
        for c in ["a", "b", "c"] {
            buffer.offer(c);
        }

        assert_eq!(buffer.drain_all(), vec!["a", "b", "c"]);
        assert!(buffer.is_empty());
        assert!(buffer.drain_all().is_empty());
    }

    #[test]
    fn test_drain_frees_capacity() {
        let buffer = BoundedBuffer::new(1);
        assert!(buffer.offer(1));
        assert!(!buffer.offer(2));
        buffer.drain_all();
        assert!(buffer.offer(3));
    }

    #[test]
    fn test_clear() {
        let buffer = BoundedBuffer::new(4);
        buffer.offer(1);
        buffer.offer(2);
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.drain_all().is_empty());
    }

    #[test]
    fn test_concurrent_offers_never_exceed_capacity() {
        let buffer = Arc::new(BoundedBuffer::new(100));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let buffer = buffer.clone();
                std::thread::spawn(move || (0..50).filter(|i| buffer.offer(t * 50 + i)).count())
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(accepted, 100);
        assert_eq!(buffer.drain_all().len(), 100);
    }
}
