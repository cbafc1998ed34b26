//! Scheduler configuration.
//!
//! [`SchedulerConfig`] is built once, validated, and injected into the
//! connectivity manager. It never changes while the manager runs. Every field
//! has a stock default, so a JSON file only needs the values it overrides:
//!
//! ```
//! use wifi_connectivity::config::SchedulerConfig;
//!
//! let config = SchedulerConfig::from_json_str(r#"{
//!     "watchdog_interval_secs": 600,
//!     "features": { "firmware_roaming": true }
//! }"#).unwrap();
//!
//! assert_eq!(config.watchdog_interval().as_secs(), 600);
//! assert!(config.features.firmware_roaming);
//! assert!(config.features.make_before_break);
//! ```
//!
//! Malformed scan schedules are not rejected here; they fall back to the
//! stock schedule when the manager builds them.

use crate::attempt::AttemptConfig;
use crate::blocklist::BlocklistConfig;
use crate::scan::ScheduleConfig;
use crate::wifi::Band;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Longest accepted duration setting, so deadlines never overflow.
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Largest accepted power-save multiplier.
pub const MAX_POWER_SAVE_MULTIPLIER: u32 = 16;

/// Low-power background scan tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    /// Interval while the device is stationary.
    pub stationary_interval_secs: u64,
    /// Interval while the device is moving or mobility is unknown.
    pub moving_interval_secs: u64,
    /// Minimum RSSI on 2.4 GHz.
    pub min_rssi_2g_dbm: i16,
    /// Minimum RSSI on 5 GHz.
    pub min_rssi_5g_dbm: i16,
    /// Minimum RSSI on 6 GHz.
    pub min_rssi_6g_dbm: i16,
    /// Debounce before restarting after a configuration change.
    pub restart_debounce_secs: u64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            stationary_interval_secs: 60,
            moving_interval_secs: 20,
            min_rssi_2g_dbm: -80,
            min_rssi_5g_dbm: -77,
            min_rssi_6g_dbm: -77,
            restart_debounce_secs: 2,
        }
    }
}

/// Link quality considered good enough to skip a periodic scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Sufficient RSSI on 2.4 GHz.
    pub sufficient_rssi_2g_dbm: i16,
    /// Sufficient RSSI on 5 and 6 GHz.
    pub sufficient_rssi_5g_dbm: i16,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            sufficient_rssi_2g_dbm: -70,
            sufficient_rssi_5g_dbm: -67,
        }
    }
}

impl LinkConfig {
    /// Sufficiency threshold for a band.
    pub fn sufficient_rssi_dbm(&self, band: Band) -> i16 {
        match band {
            Band::Ghz2_4 => self.sufficient_rssi_2g_dbm,
            Band::Ghz5 | Band::Ghz6 => self.sufficient_rssi_5g_dbm,
        }
    }
}

/// Candidate re-validation while moving fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighMobilityConfig {
    /// Whether the re-validation pass is used at all.
    pub enabled: bool,
    /// Delay before the partial re-validation scan.
    pub partial_scan_delay_secs: u64,
    /// Largest RSSI change for a candidate to count as stable.
    pub rssi_delta_db: u8,
}

impl Default for HighMobilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            partial_scan_delay_secs: 10,
            rssi_delta_db: 10,
        }
    }
}

/// Device and firmware capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Firmware roams between BSSIDs of the same network on its own.
    pub firmware_roaming: bool,
    /// A transient secondary session can be used for make-before-break.
    pub make_before_break: bool,
    /// Keep the background scan running while connected.
    pub connected_background_scan: bool,
    /// The long-lived secondary must use a different band than the primary.
    pub secondary_distinct_band: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            firmware_roaming: false,
            make_before_break: true,
            connected_background_scan: false,
            secondary_distinct_band: true,
        }
    }
}

/// Immutable configuration of the connectivity manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Periodic schedule while disconnected.
    pub disconnected_schedule: ScheduleConfig,
    /// Periodic schedule while connected.
    pub connected_schedule: ScheduleConfig,
    /// Periodic schedule while connected with exactly one saved network.
    pub single_network_schedule: ScheduleConfig,
    /// Interval multiplier in power-save mode.
    pub power_save_multiplier: u32,
    /// Background scan tuning.
    pub background: BackgroundConfig,
    /// Scan skip threshold.
    pub link: LinkConfig,
    /// Watchdog scan interval while disconnected.
    pub watchdog_interval_secs: u64,
    /// Delay before retrying a scan that failed.
    pub scan_restart_delay_secs: u64,
    /// Consecutive scan retries before giving up until the next tick.
    pub max_scan_restarts: u32,
    /// How long cached candidates may be used for a retry.
    pub candidate_validity_secs: u64,
    /// Hold on a failed BSSID while another candidate is tried.
    pub retry_block_secs: u64,
    /// How long a session request may stay unanswered.
    pub session_request_timeout_secs: u64,
    /// High-mobility re-validation.
    pub high_mobility: HighMobilityConfig,
    /// Connection attempt rate limit.
    pub attempts: AttemptConfig,
    /// Failure blocklist.
    pub blocklist: BlocklistConfig,
    /// Capabilities.
    pub features: FeatureFlags,
    /// Lines kept in the local decision log.
    pub local_log_lines: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            disconnected_schedule: ScheduleConfig::default(),
            connected_schedule: ScheduleConfig::default(),
            single_network_schedule: ScheduleConfig::from_secs(&[40, 80, 160]),
            power_save_multiplier: 2,
            background: BackgroundConfig::default(),
            link: LinkConfig::default(),
            watchdog_interval_secs: 20 * 60,
            scan_restart_delay_secs: 2,
            max_scan_restarts: 5,
            candidate_validity_secs: 10,
            retry_block_secs: 10,
            session_request_timeout_secs: 10,
            high_mobility: HighMobilityConfig::default(),
            attempts: AttemptConfig::default(),
            blocklist: BlocklistConfig::default(),
            features: FeatureFlags::default(),
            local_log_lines: 256,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.power_save_multiplier == 0
            || self.power_save_multiplier > MAX_POWER_SAVE_MULTIPLIER
        {
            return Err(ConfigError::InvalidConfig(
                "power_save_multiplier must be within 1..=16",
            ));
        }
        if self.session_request_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "session_request_timeout_secs must be > 0",
            ));
        }
        let durations = [
            self.watchdog_interval_secs,
            self.scan_restart_delay_secs,
            self.candidate_validity_secs,
            self.retry_block_secs,
            self.session_request_timeout_secs,
            self.background.stationary_interval_secs,
            self.background.moving_interval_secs,
            self.background.restart_debounce_secs,
            self.high_mobility.partial_scan_delay_secs,
        ];
        if durations.iter().any(|secs| *secs > MAX_DURATION_SECS) {
            return Err(ConfigError::InvalidConfig(
                "durations must not exceed one week",
            ));
        }
        if self.watchdog_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "watchdog_interval_secs must be > 0",
            ));
        }
        if self.scan_restart_delay_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "scan_restart_delay_secs must be > 0",
            ));
        }
        if self.candidate_validity_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "candidate_validity_secs must be > 0",
            ));
        }
        if self.background.stationary_interval_secs == 0
            || self.background.moving_interval_secs == 0
        {
            return Err(ConfigError::InvalidConfig(
                "background intervals must be > 0",
            ));
        }
        if self.high_mobility.partial_scan_delay_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "partial_scan_delay_secs must be > 0",
            ));
        }
        for rssi in [
            self.background.min_rssi_2g_dbm,
            self.background.min_rssi_5g_dbm,
            self.background.min_rssi_6g_dbm,
            self.link.sufficient_rssi_2g_dbm,
            self.link.sufficient_rssi_5g_dbm,
        ] {
            if !(-127..=0).contains(&rssi) {
                return Err(ConfigError::InvalidConfig(
                    "RSSI thresholds must be within -127..=0 dBm",
                ));
            }
        }
        if self.local_log_lines == 0 {
            return Err(ConfigError::InvalidConfig("local_log_lines must be > 0"));
        }
        self.attempts.validate().map_err(ConfigError::InvalidConfig)?;
        self.blocklist.validate().map_err(ConfigError::InvalidConfig)?;
        Ok(())
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Watchdog interval.
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    /// Scan restart delay.
    pub fn scan_restart_delay(&self) -> Duration {
        Duration::from_secs(self.scan_restart_delay_secs)
    }

    /// Candidate cache validity window.
    pub fn candidate_validity(&self) -> Duration {
        Duration::from_secs(self.candidate_validity_secs)
    }

    /// Retry hold on a failed BSSID.
    pub fn retry_block(&self) -> Duration {
        Duration::from_secs(self.retry_block_secs)
    }

    /// Background restart debounce.
    pub fn background_debounce(&self) -> Duration {
        Duration::from_secs(self.background.restart_debounce_secs)
    }

    /// Session request deadline.
    pub fn session_request_timeout(&self) -> Duration {
        Duration::from_secs(self.session_request_timeout_secs)
    }

    /// How long a high-mobility snapshot stays usable for re-validation.
    pub fn revalidation_validity(&self) -> Duration {
        self.partial_scan_delay() + self.candidate_validity()
    }

    /// Delay before the high-mobility partial rescan.
    pub fn partial_scan_delay(&self) -> Duration {
        Duration::from_secs(self.high_mobility.partial_scan_delay_secs)
    }

    /// Background scan interval for the mobility class.
    pub fn background_interval(&self, stationary: bool) -> Duration {
        if stationary {
            Duration::from_secs(self.background.stationary_interval_secs)
        } else {
            Duration::from_secs(self.background.moving_interval_secs)
        }
    }
}

/// Configuration loading errors.
#[derive(Debug)]
pub enum ConfigError {
    /// A value is out of range.
    InvalidConfig(&'static str),
    /// The file could not be read.
    Io(std::io::Error),
    /// The file is not valid JSON for this configuration.
    Json(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid scheduler config: {}", msg),
            Self::Io(e) => write!(f, "failed to read config: {}", e),
            Self::Json(e) => write!(f, "failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidConfig(_) => None,
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
