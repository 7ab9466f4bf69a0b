// Telesim Client - Telemetry collection and analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fixed-capacity FIFO.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use crate::error::StoreIntegrityError;

/// Bounded FIFO that evicts its oldest entry on overflow.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.get().min(1024)),
            capacity: capacity.get(),
        }
    }

    /// Checked constructor for a plain capacity.
    pub fn with_capacity(capacity: usize) -> Result<Self, StoreIntegrityError> {
        NonZeroUsize::new(capacity)
            .map(Self::new)
            .ok_or(StoreIntegrityError::ZeroCapacity)
    }

    /// Append an item, returning the evicted one if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Replace the contents, keeping only the newest `capacity` items.
    pub fn replace<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.items.clear();
        for item in items {
            self.push(item);
        }
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn first(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of the contents, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_three_keeps_newest() {
        let mut buffer = RingBuffer::with_capacity(3).unwrap();
        for i in 1..=4 {
            buffer.push(i);
        }
        assert_eq!(buffer.to_vec(), vec![2, 3, 4]);
        assert!(buffer.is_full());
    }

    #[test]
    fn test_push_reports_eviction() {
        let mut buffer = RingBuffer::with_capacity(2).unwrap();
        assert_eq!(buffer.push('a'), None);
        assert_eq!(buffer.push('b'), None);
        assert_eq!(buffer.push('c'), Some('a'));
        assert_eq!(buffer.first(), Some(&'b'));
        assert_eq!(buffer.last(), Some(&'c'));
    }

    #[test]
    fn test_default_capacity_overflow() {
        let mut buffer = RingBuffer::with_capacity(1000).unwrap();
        for i in 1..=1001 {
            buffer.push(i);
        }
        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer.first(), Some(&2));
        assert_eq!(buffer.last(), Some(&1001));
    }

    #[test]
    fn test_replace_truncates_oldest() {
        let mut buffer = RingBuffer::with_capacity(3).unwrap();
        buffer.push(99);
        buffer.replace(vec![1, 2, 3, 4, 5]);
        assert_eq!(buffer.to_vec(), vec![3, 4, 5]);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            RingBuffer::<u8>::with_capacity(0).unwrap_err(),
            StoreIntegrityError::ZeroCapacity
        );
    }
}
