//! Wi-Fi domain types and the configuration store seam.
//!
//! # Components
//!
//! - [`bssid`] - access point MAC address type
//! - [`network`] - saved network profiles
//! - [`store`] - configuration store trait and an in-memory implementation

mod bssid;
mod network;
mod store;

pub use bssid::{Bssid, MacAddrParseError};
pub use network::{Band, NetworkConfig, NetworkConfigError, NetworkKey, MAX_SSID_LEN};
pub use store::{ConfigChange, ConfigStore, InMemoryConfigStore};
