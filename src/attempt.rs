//! Connection attempt rate limiting.
//!
//! Attempts are tracked as a FIFO of timestamps over a sliding window. Before
//! each check, entries older than the window are evicted; if the window is
//! still full the attempt is rejected, unless the device is in foreground use
//! in which case the limit is waived.
//!
//! # Example
//!
//! ```
//! use std::time::{Duration, Instant};
//! use wifi_connectivity::attempt::{AttemptConfig, AttemptVerdict, ConnectionAttemptTracker};
//!
//! let config = AttemptConfig { window_secs: 60, max_attempts: 2 };
//! let mut tracker = ConnectionAttemptTracker::new(config).unwrap();
//! let t0 = Instant::now();
//!
//! assert_eq!(tracker.check(t0, false), AttemptVerdict::Accepted);
//! assert_eq!(tracker.check(t0, false), AttemptVerdict::Accepted);
//! assert_eq!(tracker.check(t0, false), AttemptVerdict::Rejected);
//! assert_eq!(tracker.check(t0 + Duration::from_secs(60), false), AttemptVerdict::Accepted);
//! ```

use crate::config::MAX_DURATION_SECS;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rate limit configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttemptConfig {
    /// Sliding window length in seconds.
    pub window_secs: u64,
    /// Maximum attempts per window.
    pub max_attempts: usize,
}

impl Default for AttemptConfig {
    fn default() -> Self {
        Self {
            window_secs: 4 * 60,
            max_attempts: 6,
        }
    }
}

impl AttemptConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.window_secs == 0 || self.window_secs > MAX_DURATION_SECS {
            return Err("attempt window_secs must be within 1s..=1 week");
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0");
        }
        Ok(())
    }

    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a rejected attempt must not be issued"]
pub enum AttemptVerdict {
    /// Within budget, recorded.
    Accepted,
    /// Over budget but foreground use waives the limit, recorded.
    Waived,
    /// Over budget, not recorded.
    Rejected,
}

impl AttemptVerdict {
    /// Whether the attempt may proceed.
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Sliding window of recent connection attempts.
#[derive(Debug)]
pub struct ConnectionAttemptTracker {
    config: AttemptConfig,
    window: VecDeque<Instant>,
    rejected: usize,
}

impl ConnectionAttemptTracker {
    /// Create a tracker with the given limits.
    pub fn new(config: AttemptConfig) -> Result<Self, &'static str> {
        config.validate()?;
        Ok(Self {
            config,
            window: VecDeque::with_capacity(config.max_attempts),
            rejected: 0,
        })
    }

    /// Check whether an attempt at `now` may proceed and record it if so.
    ///
    /// The window never holds more than `max_attempts` entries: a waived
    /// attempt displaces the oldest one.
    pub fn check(&mut self, now: Instant, foreground: bool) -> AttemptVerdict {
        self.evict(now);

        if self.window.len() < self.config.max_attempts {
            self.window.push_back(now);
            return AttemptVerdict::Accepted;
        }
        if foreground {
            self.window.pop_front();
            self.window.push_back(now);
            return AttemptVerdict::Waived;
        }
        self.rejected += 1;
        AttemptVerdict::Rejected
    }

    /// Forget all recorded attempts.
    pub fn clear(&mut self) {
        self.window.clear();
    }

    /// Attempts currently in the window (may include expired ones until the next check).
    pub fn len(&self) -> usize {
        self.window.len()
    }

    /// Whether the window is empty.
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Total rejections since creation.
    pub fn rejected_count(&self) -> usize {
        self.rejected
    }

    /// Recorded attempt timestamps, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Instant> {
        self.window.iter()
    }

    /// Configured limits.
    pub fn config(&self) -> &AttemptConfig {
        &self.config
    }

    fn evict(&mut self, now: Instant) {
        let window = self.config.window();
        while let Some(oldest) = self.window.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ConnectionAttemptTracker {
        ConnectionAttemptTracker::new(AttemptConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config() {
        let config = AttemptConfig {
            window_secs: 0,
            max_attempts: 6,
        };
        assert!(ConnectionAttemptTracker::new(config).is_err());
        let config = AttemptConfig {
            window_secs: 10,
            max_attempts: 0,
        };
        assert!(ConnectionAttemptTracker::new(config).is_err());
    }

    #[test]
    fn test_rejects_when_full() {
        let mut tracker = tracker();
        let t0 = Instant::now();
        for i in 0..6 {
            assert_eq!(
                tracker.check(t0 + Duration::from_secs(i), false),
                AttemptVerdict::Accepted
            );
        }
        let verdict = tracker.check(t0 + Duration::from_secs(10), false);
        assert_eq!(verdict, AttemptVerdict::Rejected);
        assert!(!verdict.is_allowed());
        assert_eq!(tracker.len(), 6);
        assert_eq!(tracker.rejected_count(), 1);
    }

    #[test]
    fn test_window_slides() {
        let mut tracker = tracker();
        let t0 = Instant::now();
        for _ in 0..6 {
            let _ = tracker.check(t0, false);
        }
        assert_eq!(
            tracker.check(t0 + Duration::from_secs(239), false),
            AttemptVerdict::Rejected
        );
        assert_eq!(
            tracker.check(t0 + Duration::from_secs(240), false),
            AttemptVerdict::Accepted
        );
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_foreground_waives_without_growing() {
        let mut tracker = tracker();
        let t0 = Instant::now();
        for _ in 0..6 {
            let _ = tracker.check(t0, false);
        }
        for i in 1..20 {
            let verdict = tracker.check(t0 + Duration::from_secs(i), true);
            assert_eq!(verdict, AttemptVerdict::Waived);
            assert!(tracker.len() <= 6);
        }
        assert_eq!(tracker.rejected_count(), 0);
    }

    #[test]
    fn test_clear() {
        let mut tracker = tracker();
        let _ = tracker.check(Instant::now(), false);
        tracker.clear();
        assert!(tracker.is_empty());
    }
}
