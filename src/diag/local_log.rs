//! Bounded in-memory log of recent decisions, included in dumps.

use std::collections::VecDeque;
use std::time::Instant;

/// Ring buffer of the last `capacity` decision lines.
#[derive(Debug)]
pub struct LocalLog {
    lines: VecDeque<String>,
    capacity: usize,
    epoch: Option<Instant>,
}

impl LocalLog {
    /// Create an empty log holding at most `capacity` lines.
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            epoch: None,
        }
    }

    /// Append a line stamped with the time since the first entry.
    pub fn push(&mut self, now: Instant, line: impl AsRef<str>) {
        let epoch = *self.epoch.get_or_insert(now);
        let t = now.saturating_duration_since(epoch);
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines
            .push_back(format!("[{:>9.3}s] {}", t.as_secs_f64(), line.as_ref()));
    }

    /// Lines, oldest first.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Number of lines held.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
