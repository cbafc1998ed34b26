//! Scan engine seam.
//!
//! The engine talks to the radio. Starting a scan returns immediately; results
//! or a late failure arrive later as [`crate::Event::ScanResults`] /
//! [`crate::Event::ScanFailure`] carrying the same [`ScanId`]. A synchronous
//! `Err` from [`ScanEngine::start_scan`] is an issuance failure and is
//! handled exactly like a late one.

use super::ScanMode;
use crate::wifi::{Band, Bssid};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Radio scheduling hint for a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanType {
    /// Finish quickly.
    LowLatency,
    /// Minimize power, may take longer.
    LowPower,
    /// Dwell longer for a complete picture.
    HighAccuracy,
}

/// Identifier correlating a scan request with its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScanId(pub u64);

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parameters of a single scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSettings {
    /// What asked for the scan.
    pub mode: ScanMode,
    /// Radio scheduling hint.
    pub scan_type: ScanType,
    /// Channel list in MHz; `None` scans every band.
    pub channels: Option<Vec<u32>>,
}

impl ScanSettings {
    /// Full-band scan.
    pub fn full(mode: ScanMode, scan_type: ScanType) -> Self {
        Self {
            mode,
            scan_type,
            channels: None,
        }
    }

    /// Channel-restricted scan.
    pub fn partial(mode: ScanMode, scan_type: ScanType, channels: Vec<u32>) -> Self {
        Self {
            mode,
            scan_type,
            channels: Some(channels),
        }
    }

    /// Whether every band is scanned.
    pub fn is_full(&self) -> bool {
        self.channels.is_none()
    }
}

/// A network the background scan should look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundNetwork {
    /// SSID to match.
    pub ssid: String,
}

/// Parameters of the long-running low-power background scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundScanSettings {
    /// Interval between low-power scan passes.
    pub interval: Duration,
    /// Minimum RSSI on 2.4 GHz.
    pub min_rssi_2g_dbm: i16,
    /// Minimum RSSI on 5 GHz.
    pub min_rssi_5g_dbm: i16,
    /// Minimum RSSI on 6 GHz.
    pub min_rssi_6g_dbm: i16,
    /// Networks to report.
    pub networks: Vec<BackgroundNetwork>,
}

impl BackgroundScanSettings {
    /// Signal floor for a band.
    pub fn min_rssi_dbm(&self, band: Band) -> i16 {
        match band {
            Band::Ghz2_4 => self.min_rssi_2g_dbm,
            Band::Ghz5 => self.min_rssi_5g_dbm,
            Band::Ghz6 => self.min_rssi_6g_dbm,
        }
    }
}

/// One access point observed by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDetail {
    /// Advertised SSID.
    pub ssid: String,
    /// Access point BSSID.
    pub bssid: Bssid,
    /// Center frequency in MHz.
    pub frequency_mhz: u32,
    /// Received signal strength.
    pub rssi_dbm: i16,
    /// When the BSS was last heard.
    pub timestamp: Instant,
}

/// Scan engine failure reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Radio busy with another request.
    Busy,
    /// Radio not available (off, resetting).
    NotAvailable,
    /// Request rejected by the driver.
    Rejected(String),
    /// Scan started but was aborted.
    Aborted,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "scanner busy"),
            Self::NotAvailable => write!(f, "scanner not available"),
            Self::Rejected(reason) => write!(f, "scan rejected: {}", reason),
            Self::Aborted => write!(f, "scan aborted"),
        }
    }
}

impl std::error::Error for ScanError {}

/// Radio scan operations.
pub trait ScanEngine: Send {
    /// Start a one-shot scan; results are delivered later under `id`.
    fn start_scan(&mut self, id: ScanId, settings: &ScanSettings) -> Result<(), ScanError>;

    /// Start (or replace) the background scan.
    fn start_background_scan(&mut self, settings: &BackgroundScanSettings)
        -> Result<(), ScanError>;

    /// Stop the background scan if one is running.
    fn stop_background_scan(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_and_partial_settings() {
        let full = ScanSettings::full(ScanMode::Watchdog, ScanType::HighAccuracy);
        assert!(full.is_full());

        let partial = ScanSettings::partial(
            ScanMode::DelayedPartial,
            ScanType::LowLatency,
            vec![2412, 5180],
        );
        assert!(!partial.is_full());
        assert_eq!(partial.channels.as_deref(), Some(&[2412, 5180][..]));
    }

    #[test]
    fn test_background_floor_per_band() {
        let settings = BackgroundScanSettings {
            interval: Duration::from_secs(20),
            min_rssi_2g_dbm: -80,
            min_rssi_5g_dbm: -77,
            min_rssi_6g_dbm: -75,
            networks: Vec::new(),
        };
        assert_eq!(settings.min_rssi_dbm(Band::Ghz2_4), -80);
        assert_eq!(settings.min_rssi_dbm(Band::Ghz5), -77);
        assert_eq!(settings.min_rssi_dbm(Band::Ghz6), -75);
    }

    #[test]
    fn test_scan_type_serde_names() {
        let t: ScanType = serde_json::from_str("\"high_accuracy\"").unwrap();
        assert_eq!(t, ScanType::HighAccuracy);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ScanError::Rejected("no firmware".into()).to_string(),
            "scan rejected: no firmware"
        );
    }
}
