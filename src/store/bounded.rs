//! Fixed-capacity log that evicts its oldest entries first.

use std::collections::VecDeque;

/// Append-only collection capped at `capacity` most-recent entries.
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedLog<T> {
    /// Empty log holding at most `capacity` entries (zero is treated as one).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Build a log from existing entries, keeping only the newest `capacity`.
    pub fn from_entries(capacity: usize, entries: impl IntoIterator<Item = T>) -> Self {
        let mut log = Self::new(capacity);
        for entry in entries {
            log.push(entry);
        }
        log
    }

    /// Append an entry, returning the evicted oldest entry when full.
    pub fn push(&mut self, entry: T) -> Option<T> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    /// Newest entry.
    pub fn last(&self) -> Option<&T> {
        self.entries.back()
    }
}

impl<T: Clone> BoundedLog<T> {
    /// Up to `limit` newest entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<T> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }
}
