//! Connectable candidates built from scan results.
//!
//! # Components
//!
//! - [`cache`] - latest candidate set kept for failure retries
//! - [`selector`] - exclusion set and the pluggable network selector

mod cache;
mod selector;

pub use cache::CandidateCache;
pub use selector::{ExcludeSet, NetworkSelector, StrongestSignalSelector};

use crate::scan::ScanDetail;
use crate::wifi::{Band, Bssid, NetworkConfig, NetworkKey};
use std::collections::HashMap;
use std::time::Instant;

/// A saved network observed at one access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Matching saved profile.
    pub network: NetworkKey,
    /// Observed SSID.
    pub ssid: String,
    /// Access point.
    pub bssid: Bssid,
    /// Center frequency in MHz.
    pub frequency_mhz: u32,
    /// Received signal strength.
    pub rssi_dbm: i16,
    /// Reserved for the secondary connection path.
    pub restricted: bool,
    /// When the access point was seen.
    pub scan_timestamp: Instant,
}

impl Candidate {
    /// Band of the candidate, if the frequency is a known Wi-Fi channel.
    pub fn band(&self) -> Option<Band> {
        Band::from_frequency(self.frequency_mhz)
    }
}

/// Match scan results against saved profiles.
///
/// Only enabled profiles are considered, and a profile pinned to a BSSID only
/// matches that access point. If an access point is reported more than once
/// the strongest report wins.
pub fn build_candidates(results: &[ScanDetail], networks: &[NetworkConfig]) -> Vec<Candidate> {
    let mut by_ssid: HashMap<&str, Vec<&NetworkConfig>> = HashMap::new();
    for net in networks.iter().filter(|n| n.enabled) {
        by_ssid.entry(net.ssid.as_str()).or_default().push(net);
    }

    let mut candidates: Vec<Candidate> = Vec::new();
    for detail in results {
        let Some(profiles) = by_ssid.get(detail.ssid.as_str()) else {
            continue;
        };
        for net in profiles.iter().filter(|n| n.allows_bssid(detail.bssid)) {
            let existing = candidates
                .iter_mut()
                .find(|c| c.network == net.key && c.bssid == detail.bssid);
            match existing {
                Some(c) if c.rssi_dbm >= detail.rssi_dbm => {}
                Some(c) => {
                    c.rssi_dbm = detail.rssi_dbm;
                    c.frequency_mhz = detail.frequency_mhz;
                    c.scan_timestamp = detail.timestamp;
                }
                None => candidates.push(Candidate {
                    network: net.key.clone(),
                    ssid: detail.ssid.clone(),
                    bssid: detail.bssid,
                    frequency_mhz: detail.frequency_mhz,
                    rssi_dbm: detail.rssi_dbm,
                    restricted: net.restricted,
                    scan_timestamp: detail.timestamp,
                }),
            }
        }
    }
    candidates
}

/// Keep candidates that were already present in `previous` with a similar signal.
///
/// New access points, and ones whose RSSI moved by more than `max_delta_db`,
/// are dropped.
pub fn stable_candidates(
    previous: &[Candidate],
    current: Vec<Candidate>,
    max_delta_db: u8,
) -> Vec<Candidate> {
    current
        .into_iter()
        .filter(|c| {
            previous.iter().any(|p| {
                p.network == c.network
                    && p.bssid == c.bssid
                    && (i32::from(p.rssi_dbm) - i32::from(c.rssi_dbm)).unsigned_abs()
                        <= u32::from(max_delta_db)
            })
        })
        .collect()
}
