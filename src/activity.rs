//! Bounded activity log.
//!
//! Keeps the most recent human-readable events for the `/logs` endpoint and
//! mirrors each one into `tracing` under the `activity` target.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Default number of entries retained.
pub const DEFAULT_CAPACITY: usize = 50;

/// A single timestamped log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Fixed-capacity FIFO ring of [`LogEntry`] values.
///
/// Cheap to clone; all clones share the same ring. Appends and snapshots
/// are serialized by one internal lock, so the buffer can be written from
/// request handlers and client event callbacks alike.
#[derive(Clone)]
pub struct LogBuffer {
    capacity: usize,
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a message, evicting the oldest entry once full.
    pub fn append(&self, message: impl Into<String>) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        };
        tracing::info!(target: "activity", "{}", entry.message);

        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Consistent copy of the ring, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
