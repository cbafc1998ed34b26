//! Saved network profiles.
//!
//! These are the connectable networks known to the configuration store. The
//! connectivity loop only reads them, apart from toggling `enabled` when a
//! network-level block starts or clears.
//!
//! # Example
//!
//! ```
//! use wifi_connectivity::wifi::{NetworkConfig, NetworkKey};
//!
//! let office = NetworkConfig::new("office-psk", "Office").unwrap();
//! assert_eq!(office.key, NetworkKey::new("office-psk"));
//! assert!(office.enabled);
//! ```

use super::Bssid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum SSID length per IEEE 802.11 standard.
pub const MAX_SSID_LEN: usize = 32;

/// Stable identifier of a saved network profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkKey(String);

impl NetworkKey {
    /// Create a network key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Frequency band of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    /// 2.4 GHz.
    Ghz2_4,
    /// 5 GHz.
    Ghz5,
    /// 6 GHz.
    Ghz6,
}

impl Band {
    /// Classify a center frequency in MHz.
    pub fn from_frequency(frequency_mhz: u32) -> Option<Self> {
        match frequency_mhz {
            2400..=2500 => Some(Self::Ghz2_4),
            4900..=5900 => Some(Self::Ghz5),
            5925..=7125 => Some(Self::Ghz6),
            _ => None,
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ghz2_4 => write!(f, "2.4GHz"),
            Self::Ghz5 => write!(f, "5GHz"),
            Self::Ghz6 => write!(f, "6GHz"),
        }
    }
}

/// A saved network profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Profile identifier.
    pub key: NetworkKey,
    /// Network SSID (1-32 bytes).
    pub ssid: String,
    /// Whether auto-connect may pick this network.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Network requires the factory (non-randomized) MAC address.
    #[serde(default)]
    pub fixed_identity: bool,
    /// Reserved for the secondary connection path (e.g. OEM-restricted).
    #[serde(default)]
    pub restricted: bool,
    /// Pin connections to this BSSID only.
    #[serde(default)]
    pub bssid: Option<Bssid>,
    /// Profiles that share credentials and may be roamed between.
    #[serde(default)]
    pub linked: Vec<NetworkKey>,
}

fn default_true() -> bool {
    true
}

impl NetworkConfig {
    /// Create an enabled profile with default flags.
    pub fn new(key: impl Into<String>, ssid: impl Into<String>) -> Result<Self, NetworkConfigError> {
        let config = Self {
            key: NetworkKey::new(key),
            ssid: ssid.into(),
            enabled: true,
            fixed_identity: false,
            restricted: false,
            bssid: None,
            linked: Vec::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the profile.
    pub fn validate(&self) -> Result<(), NetworkConfigError> {
        if self.key.as_str().is_empty() {
            return Err(NetworkConfigError::KeyEmpty);
        }
        if self.ssid.is_empty() {
            return Err(NetworkConfigError::SsidEmpty);
        }
        if self.ssid.len() > MAX_SSID_LEN {
            return Err(NetworkConfigError::SsidTooLong {
                len: self.ssid.len(),
                max: MAX_SSID_LEN,
            });
        }
        Ok(())
    }

    /// Same profile, or one listed as linked in either direction.
    pub fn is_same_or_linked(&self, other: &NetworkConfig) -> bool {
        self.key == other.key || self.linked.contains(&other.key) || other.linked.contains(&self.key)
    }

    /// Whether a connection to `bssid` is allowed by the pinned BSSID, if any.
    pub fn allows_bssid(&self, bssid: Bssid) -> bool {
        self.bssid.map_or(true, |pinned| pinned == bssid)
    }
}

/// Errors from profile validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkConfigError {
    /// Profile key is empty.
    KeyEmpty,
    /// SSID is empty.
    SsidEmpty,
    /// SSID exceeds maximum length.
    SsidTooLong { len: usize, max: usize },
}

impl fmt::Display for NetworkConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyEmpty => write!(f, "network key cannot be empty"),
            Self::SsidEmpty => write!(f, "SSID cannot be empty"),
            Self::SsidTooLong { len, max } => {
                write!(f, "SSID too long: {} bytes (max {})", len, max)
            }
        }
    }
}

impl std::error::Error for NetworkConfigError {}
