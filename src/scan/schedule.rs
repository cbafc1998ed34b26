//! Periodic scan schedules and the backoff cursor.
//!
//! A schedule is an ordered list of intervals with a parallel list of scan
//! type tags. The scheduler walks it with a [`BackoffCursor`]: each periodic
//! tick uses `schedule[cursor]` and advances the cursor, so intervals grow
//! until they clamp at the last entry. Externally triggered rescans (screen
//! on, user request, connectivity change) reset the cursor to 0.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use wifi_connectivity::scan::{BackoffCursor, ScanSchedule};
//!
//! let schedule = ScanSchedule::default();
//! let mut cursor = BackoffCursor::new();
//!
//! let mut intervals = Vec::new();
//! for _ in 0..6 {
//!     intervals.push(schedule.interval(cursor.get()).as_secs());
//!     cursor.advance();
//! }
//! assert_eq!(intervals, vec![20, 40, 80, 160, 160, 160]);
//! ```

use super::ScanType;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Stock schedule in seconds.
pub const DEFAULT_SCHEDULE_SECS: [u64; 4] = [20, 40, 80, 160];

/// Longest accepted schedule interval.
pub const MAX_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Schedule as written in configuration.
///
/// An empty `scan_types` list means every entry uses [`ScanType::LowLatency`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Intervals in seconds, non-decreasing.
    pub intervals_secs: Vec<u64>,
    /// Scan type for each interval.
    pub scan_types: Vec<ScanType>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            intervals_secs: DEFAULT_SCHEDULE_SECS.to_vec(),
            scan_types: Vec::new(),
        }
    }
}

impl ScheduleConfig {
    /// Schedule with the given intervals and default scan types.
    pub fn from_secs(intervals_secs: &[u64]) -> Self {
        Self {
            intervals_secs: intervals_secs.to_vec(),
            scan_types: Vec::new(),
        }
    }
}

/// Why a configured schedule was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// No intervals.
    Empty,
    /// An interval of zero seconds.
    ZeroInterval { index: usize },
    /// Interval shorter than its predecessor.
    NotMonotonic { index: usize },
    /// Interval longer than [`MAX_INTERVAL_SECS`].
    TooLong { index: usize },
    /// Scan type list does not match the interval list.
    TypeCountMismatch { intervals: usize, types: usize },
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "schedule has no intervals"),
            Self::ZeroInterval { index } => write!(f, "interval {} is zero", index),
            Self::NotMonotonic { index } => {
                write!(f, "interval {} is shorter than the previous one", index)
            }
            Self::TooLong { index } => {
                write!(f, "interval {} exceeds {}s", index, MAX_INTERVAL_SECS)
            }
            Self::TypeCountMismatch { intervals, types } => write!(
                f,
                "{} scan types given for {} intervals",
                types, intervals
            ),
        }
    }
}

impl std::error::Error for ScheduleError {}

/// Validated scan schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSchedule {
    intervals: Vec<Duration>,
    types: Vec<ScanType>,
}

impl Default for ScanSchedule {
    fn default() -> Self {
        Self {
            intervals: DEFAULT_SCHEDULE_SECS
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
            types: vec![ScanType::LowLatency; DEFAULT_SCHEDULE_SECS.len()],
        }
    }
}

impl ScanSchedule {
    /// Build a schedule from configuration.
    pub fn new(config: &ScheduleConfig) -> Result<Self, ScheduleError> {
        let secs = &config.intervals_secs;
        if secs.is_empty() {
            return Err(ScheduleError::Empty);
        }
        for (index, s) in secs.iter().enumerate() {
            if *s == 0 {
                return Err(ScheduleError::ZeroInterval { index });
            }
            if *s > MAX_INTERVAL_SECS {
                return Err(ScheduleError::TooLong { index });
            }
            if index > 0 && *s < secs[index - 1] {
                return Err(ScheduleError::NotMonotonic { index });
            }
        }

        let types = if config.scan_types.is_empty() {
            vec![ScanType::LowLatency; secs.len()]
        } else if config.scan_types.len() == secs.len() {
            config.scan_types.clone()
        } else {
            return Err(ScheduleError::TypeCountMismatch {
                intervals: secs.len(),
                types: config.scan_types.len(),
            });
        };

        Ok(Self {
            intervals: secs.iter().map(|s| Duration::from_secs(*s)).collect(),
            types,
        })
    }

    /// Build a schedule, falling back to the stock schedule if malformed.
    pub fn or_default(config: &ScheduleConfig, name: &str) -> Self {
        match Self::new(config) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!("Malformed {} scan schedule ({}), using default", name, e);
                Self::default()
            }
        }
    }

    /// Interval at `cursor`, clamped to the last entry.
    pub fn interval(&self, cursor: usize) -> Duration {
        self.intervals[cursor.min(self.intervals.len() - 1)]
    }

    /// Scan type at `cursor`, clamped to the last entry.
    pub fn scan_type(&self, cursor: usize) -> ScanType {
        self.types[cursor.min(self.types.len() - 1)]
    }

    /// All intervals.
    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Always false, schedules are never empty.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

impl fmt::Display for ScanSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs: Vec<String> = self
            .intervals
            .iter()
            .map(|d| d.as_secs().to_string())
            .collect();
        write!(f, "[{}]s", secs.join(","))
    }
}

/// Monotonically increasing index into a schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffCursor(usize);

impl BackoffCursor {
    /// Cursor at the first entry.
    pub fn new() -> Self {
        Self(0)
    }

    /// Current index.
    pub fn get(&self) -> usize {
        self.0
    }

    /// Move to the next entry.
    pub fn advance(&mut self) {
        self.0 = self.0.saturating_add(1);
    }

    /// Back to the first entry.
    pub fn reset(&mut self) {
        self.0 = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let schedule = ScanSchedule::default();
        assert_eq!(schedule.len(), 4);
        assert_eq!(schedule.interval(0), Duration::from_secs(20));
        assert_eq!(schedule.to_string(), "[20,40,80,160]s");
    }

    #[test]
    fn test_interval_clamps_to_last() {
        let schedule = ScanSchedule::new(&ScheduleConfig::from_secs(&[10, 30])).unwrap();
        assert_eq!(schedule.interval(1), Duration::from_secs(30));
        assert_eq!(schedule.interval(2), Duration::from_secs(30));
        assert_eq!(schedule.interval(usize::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_is_monotonic_until_reset() {
        let schedule = ScanSchedule::new(&ScheduleConfig::from_secs(&[5, 5, 20, 60, 300])).unwrap();
        let mut cursor = BackoffCursor::new();
        let mut previous = schedule.interval(cursor.get());
        for _ in 0..20 {
            cursor.advance();
            let next = schedule.interval(cursor.get());
            assert!(next >= previous);
            previous = next;
        }
        cursor.reset();
        assert_eq!(schedule.interval(cursor.get()), Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_malformed() {
        assert_eq!(
            ScanSchedule::new(&ScheduleConfig::from_secs(&[])),
            Err(ScheduleError::Empty)
        );
        assert_eq!(
            ScanSchedule::new(&ScheduleConfig::from_secs(&[20, 0])),
            Err(ScheduleError::ZeroInterval { index: 1 })
        );
        assert_eq!(
            ScanSchedule::new(&ScheduleConfig::from_secs(&[40, 20])),
            Err(ScheduleError::NotMonotonic { index: 1 })
        );
        assert_eq!(
            ScanSchedule::new(&ScheduleConfig::from_secs(&[20, u64::MAX])),
            Err(ScheduleError::TooLong { index: 1 })
        );
        let config = ScheduleConfig {
            intervals_secs: vec![20, 40],
            scan_types: vec![ScanType::LowPower],
        };
        assert_eq!(
            ScanSchedule::new(&config),
            Err(ScheduleError::TypeCountMismatch {
                intervals: 2,
                types: 1
            })
        );
    }

    #[test]
    fn test_or_default_falls_back() {
        let schedule = ScanSchedule::or_default(&ScheduleConfig::from_secs(&[0]), "test");
        assert_eq!(schedule, ScanSchedule::default());
    }

    #[test]
    fn test_scan_types_follow_cursor() {
        let config = ScheduleConfig {
            intervals_secs: vec![20, 40, 80],
            scan_types: vec![
                ScanType::HighAccuracy,
                ScanType::LowLatency,
                ScanType::LowPower,
            ],
        };
        let schedule = ScanSchedule::new(&config).unwrap();
        assert_eq!(schedule.scan_type(0), ScanType::HighAccuracy);
        assert_eq!(schedule.scan_type(2), ScanType::LowPower);
        assert_eq!(schedule.scan_type(7), ScanType::LowPower);
    }
}
