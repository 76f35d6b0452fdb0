//! Fixed-capacity, insertion-ordered history buffer.
//!
//! Both the RF packet history and the device log use this buffer: entries
//! are appended at the back and the oldest entries are evicted from the
//! front once capacity is reached. Buffer order is always insertion order;
//! consumers that want recency-first output reverse a read-only view.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;

// ============================================================================
// History
// ============================================================================

/// A bounded, insertion-ordered buffer with oldest-first eviction.
#[derive(Debug, Clone)]
pub struct History<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> History<T> {
    /// Creates an empty buffer with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be non-zero");
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an entry, evicting from the front once over capacity.
    pub fn push(&mut self, entry: T) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Empties the buffer.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns the number of buffered entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are buffered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the configured capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates in insertion order (oldest first).
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    /// Iterates newest-first without reordering the buffer.
    pub fn iter_recent(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().rev()
    }

    /// Returns the most recently appended entry.
    #[inline]
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }
}

impl<'a, T> IntoIterator for &'a History<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================
