//! Bounded, insertion-ordered entry store.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::entry::LogEntry;

/// Default number of retained entries.
pub const DEFAULT_MAX_LOGS: usize = 100;

/// Fixed-capacity buffer; the newest entry is at the front.
#[derive(Debug, Clone)]
pub struct RetentionBuffer {
    entries: VecDeque<Arc<LogEntry>>,
    capacity: usize,
}

impl Default for RetentionBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LOGS)
    }
}

impl RetentionBuffer {
    /// Create a buffer. A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the head, evicting the oldest entry when full.
    pub fn append(&mut self, entry: Arc<LogEntry>) {
        self.entries.push_front(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    /// Remove entries stamped strictly before `cutoff`. Returns the count removed.
    pub fn prune(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.timestamp() >= cutoff);
        before - self.entries.len()
    }

    /// Entries, most recent first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<LogEntry>> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
