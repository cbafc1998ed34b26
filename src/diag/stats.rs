//! Connectivity counters.
//!
//! Shared through an `Arc` between the manager task and the stats server.
//! All fields are atomics so readers never lock.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Scan counters.
#[derive(Debug, Default)]
pub struct ScanStats {
    /// Scans handed to the engine.
    pub started: AtomicUsize,
    /// Periodic ticks that decided no scan was needed.
    pub skipped: AtomicUsize,
    /// Scans that failed to issue or complete.
    pub failed: AtomicUsize,
    /// Failed scans scheduled for a retry.
    pub retried: AtomicUsize,
    /// Failed scans given up after the retry budget.
    pub abandoned: AtomicUsize,
    /// Background scans started.
    pub background: AtomicUsize,
}

/// Selection and connection counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Selection passes.
    pub selections: AtomicUsize,
    /// Selection passes that found nothing.
    pub no_candidate: AtomicUsize,
    /// Plain connects.
    pub connects: AtomicUsize,
    /// Roams.
    pub roams: AtomicUsize,
    /// Make-before-break handoffs started.
    pub make_before_break: AtomicUsize,
    /// Break-before-make switches.
    pub break_before_make: AtomicUsize,
    /// Connects on the long-lived secondary session.
    pub secondary_connects: AtomicUsize,
    /// Attempts dropped by the rate limit.
    pub rate_limited: AtomicUsize,
    /// Immediate retries after a failure.
    pub local_retries: AtomicUsize,
    /// Session requests that were denied.
    pub session_requests_denied: AtomicUsize,
    /// BSSIDs and networks added to the blocklist.
    pub blocklist_additions: AtomicUsize,
}

/// All connectivity counters.
#[derive(Debug)]
pub struct ConnectivityStats {
    start_time: Instant,
    /// Scan counters.
    pub scans: ScanStats,
    /// Selection and connection counters.
    pub connections: ConnectionStats,
}

impl Default for ConnectivityStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Bump a counter by one.
pub fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn read(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::Relaxed)
}

impl ConnectivityStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            scans: ScanStats::default(),
            connections: ConnectionStats::default(),
        }
    }

    /// Seconds since creation.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime_secs: self.uptime_secs(),
            scans: ScanSnapshot {
                started: read(&self.scans.started),
                skipped: read(&self.scans.skipped),
                failed: read(&self.scans.failed),
                retried: read(&self.scans.retried),
                abandoned: read(&self.scans.abandoned),
                background: read(&self.scans.background),
            },
            connections: ConnectionSnapshot {
                selections: read(&self.connections.selections),
                no_candidate: read(&self.connections.no_candidate),
                connects: read(&self.connections.connects),
                roams: read(&self.connections.roams),
                make_before_break: read(&self.connections.make_before_break),
                break_before_make: read(&self.connections.break_before_make),
                secondary_connects: read(&self.connections.secondary_connects),
                rate_limited: read(&self.connections.rate_limited),
                local_retries: read(&self.connections.local_retries),
                session_requests_denied: read(&self.connections.session_requests_denied),
                blocklist_additions: read(&self.connections.blocklist_additions),
            },
        }
    }

    /// Serialize all counters to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Serializable copy of [`ScanStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSnapshot {
    pub started: usize,
    pub skipped: usize,
    pub failed: usize,
    pub retried: usize,
    pub abandoned: usize,
    pub background: usize,
}

/// Serializable copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    pub selections: usize,
    pub no_candidate: usize,
    pub connects: usize,
    pub roams: usize,
    pub make_before_break: usize,
    pub break_before_make: usize,
    pub secondary_connects: usize,
    pub rate_limited: usize,
    pub local_retries: usize,
    pub session_requests_denied: usize,
    pub blocklist_additions: usize,
}

/// Serializable copy of [`ConnectivityStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub scans: ScanSnapshot,
    pub connections: ConnectionSnapshot,
}
