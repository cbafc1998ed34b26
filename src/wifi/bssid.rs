//! BSSID (access point MAC address) type.
//!
//! # Example
//!
//! ```
//! use wifi_connectivity::wifi::Bssid;
//!
//! let bssid: Bssid = "aa:bb:cc:dd:ee:ff".parse().unwrap();
//! assert_eq!(bssid.to_string(), "aa:bb:cc:dd:ee:ff");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 48-bit BSSID of an access point radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Bssid([u8; 6]);

impl Bssid {
    /// Create a BSSID from raw octets.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for Bssid {
    type Err = MacAddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.trim().split(':');

        for octet in octets.iter_mut() {
            let part = parts.next().ok_or(MacAddrParseError::WrongLength)?;
            if part.len() != 2 {
                return Err(MacAddrParseError::InvalidOctet(part.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| MacAddrParseError::InvalidOctet(part.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(MacAddrParseError::WrongLength);
        }
        Ok(Self(octets))
    }
}

impl TryFrom<String> for Bssid {
    type Error = MacAddrParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Bssid> for String {
    fn from(bssid: Bssid) -> Self {
        bssid.to_string()
    }
}

/// Error parsing a textual MAC address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacAddrParseError {
    /// Not exactly six colon-separated octets.
    WrongLength,
    /// An octet is not two hex digits.
    InvalidOctet(String),
}

impl fmt::Display for MacAddrParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongLength => write!(f, "MAC address must have 6 octets"),
            Self::InvalidOctet(o) => write!(f, "invalid MAC octet '{}'", o),
        }
    }
}

impl std::error::Error for MacAddrParseError {}
