//! Scanning: engine seam, scan modes and periodic schedules.
//!
//! This module contains:
//! - [`engine`]: the [`ScanEngine`] trait and scan request/result types
//! - [`schedule`]: [`ScanSchedule`] and its [`BackoffCursor`]

mod engine;
mod schedule;

pub use engine::{
    BackgroundNetwork, BackgroundScanSettings, ScanDetail, ScanEngine, ScanError, ScanId,
    ScanSettings, ScanType,
};
pub use schedule::{
    BackoffCursor, ScanSchedule, ScheduleConfig, ScheduleError, DEFAULT_SCHEDULE_SECS,
    MAX_INTERVAL_SECS,
};

use std::fmt;

/// What a scan was started for.
///
/// `PeriodicForeground` and `BackgroundLowPower` are base modes, at most one
/// of which is active. The others are one-shot overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    /// Screen-on periodic scanning with backoff.
    PeriodicForeground,
    /// Screen-off low-power scanning for known networks.
    BackgroundLowPower,
    /// Liveness scan while disconnected.
    Watchdog,
    /// On-demand scan.
    Forced,
    /// High-mobility re-validation.
    DelayedPartial,
}

impl ScanMode {
    /// Whether this is one of the two base modes.
    pub fn is_base(&self) -> bool {
        matches!(self, Self::PeriodicForeground | Self::BackgroundLowPower)
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeriodicForeground => write!(f, "periodic"),
            Self::BackgroundLowPower => write!(f, "background"),
            Self::Watchdog => write!(f, "watchdog"),
            Self::Forced => write!(f, "forced"),
            Self::DelayedPartial => write!(f, "delayed-partial"),
        }
    }
}
