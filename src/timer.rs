//! One-shot timers keyed by tag.
//!
//! The connectivity loop never sleeps. It arms deadlines here and whoever
//! drives the loop (the tokio service, or a test advancing a simulated clock)
//! asks for the next deadline and fires due timers back into the manager.
//! Each tag has at most one pending deadline; re-arming replaces it.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

/// Identifies one kind of scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerTag {
    /// Next foreground periodic scan.
    PeriodicScan,
    /// Liveness scan while disconnected.
    Watchdog,
    /// Retry of a scan that failed to start.
    ScanRestart,
    /// Debounced or failed background scan restart.
    BackgroundRestart,
    /// Partial rescan re-validating high-mobility candidates.
    DelayedPartialScan,
    /// Deadline of the oldest unanswered session request.
    SessionRequest,
}

impl fmt::Display for TimerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeriodicScan => write!(f, "periodic-scan"),
            Self::Watchdog => write!(f, "watchdog"),
            Self::ScanRestart => write!(f, "scan-restart"),
            Self::BackgroundRestart => write!(f, "background-restart"),
            Self::DelayedPartialScan => write!(f, "delayed-partial-scan"),
            Self::SessionRequest => write!(f, "session-request"),
        }
    }
}

/// Pending one-shot timers.
#[derive(Debug, Default)]
pub struct TimerQueue {
    deadlines: BTreeMap<TimerTag, Instant>,
}

impl TimerQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `tag` at `deadline`, replacing any pending deadline for it.
    pub fn schedule(&mut self, tag: TimerTag, deadline: Instant) {
        self.deadlines.insert(tag, deadline);
    }

    /// Cancel `tag`. Returns whether it was pending.
    pub fn cancel(&mut self, tag: TimerTag) -> bool {
        self.deadlines.remove(&tag).is_some()
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&mut self) {
        self.deadlines.clear();
    }

    /// Whether `tag` is armed.
    pub fn is_pending(&self, tag: TimerTag) -> bool {
        self.deadlines.contains_key(&tag)
    }

    /// Deadline of `tag`, if armed.
    pub fn deadline(&self, tag: TimerTag) -> Option<Instant> {
        self.deadlines.get(&tag).copied()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return the earliest timer due at or before `now`.
    ///
    /// Ties are broken by tag order so firing is deterministic.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerTag, Instant)> {
        let (tag, deadline) = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .min_by_key(|(tag, deadline)| (**deadline, **tag))
            .map(|(tag, deadline)| (*tag, *deadline))?;
        self.deadlines.remove(&tag);
        Some((tag, deadline))
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// Whether no timer is armed.
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Armed timers in tag order.
    pub fn iter(&self) -> impl Iterator<Item = (TimerTag, Instant)> + '_ {
        self.deadlines.iter().map(|(t, d)| (*t, *d))
    }
}
