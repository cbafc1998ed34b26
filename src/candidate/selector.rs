//! Network selection seam.
//!
//! The selector is a pure function of the candidate list and an exclusion
//! set. The manager builds the exclusions (blocklist, SSIDs already held by
//! other sessions, the primary's BSSID and band for the secondary path) and
//! never asks a selector to reason about sessions itself.

use super::Candidate;
use crate::wifi::{Band, Bssid, NetworkKey};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Candidates a selector must not pick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExcludeSet {
    /// Blocked access points.
    pub bssids: HashSet<Bssid>,
    /// Blocked networks.
    pub networks: HashSet<NetworkKey>,
    /// SSIDs already served by another session.
    pub ssids: HashSet<String>,
    /// Bands in use by another session.
    pub bands: HashSet<Band>,
}

impl ExcludeSet {
    /// Empty exclusion set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `candidate` is excluded.
    pub fn excludes(&self, candidate: &Candidate) -> bool {
        self.bssids.contains(&candidate.bssid)
            || self.networks.contains(&candidate.network)
            || self.ssids.contains(&candidate.ssid)
            || candidate.band().is_some_and(|b| self.bands.contains(&b))
    }

    /// Whether nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.bssids.is_empty()
            && self.networks.is_empty()
            && self.ssids.is_empty()
            && self.bands.is_empty()
    }
}

/// Picks the best candidate.
pub trait NetworkSelector: Send {
    /// Choose among `candidates` that are not in `exclude`.
    fn select_network(&self, candidates: &[Candidate], exclude: &ExcludeSet) -> Option<Candidate>;
}

/// Highest RSSI wins, with a bonus for 5 and 6 GHz.
///
/// Ties are broken by network key and then BSSID so the choice is stable.
#[derive(Debug, Clone, Copy)]
pub struct StrongestSignalSelector {
    /// Bonus added to 5 and 6 GHz candidates.
    pub high_band_bonus_db: i16,
}

impl Default for StrongestSignalSelector {
    fn default() -> Self {
        Self {
            high_band_bonus_db: 5,
        }
    }
}

impl StrongestSignalSelector {
    fn score(&self, candidate: &Candidate) -> i32 {
        let bonus = match candidate.band() {
            Some(Band::Ghz5) | Some(Band::Ghz6) => self.high_band_bonus_db,
            _ => 0,
        };
        i32::from(candidate.rssi_dbm) + i32::from(bonus)
    }

    fn compare(&self, a: &Candidate, b: &Candidate) -> Ordering {
        self.score(a)
            .cmp(&self.score(b))
            .then_with(|| b.network.cmp(&a.network))
            .then_with(|| b.bssid.cmp(&a.bssid))
    }
}

impl NetworkSelector for StrongestSignalSelector {
    fn select_network(&self, candidates: &[Candidate], exclude: &ExcludeSet) -> Option<Candidate> {
        candidates
            .iter()
            .filter(|c| !exclude.excludes(c))
            .max_by(|a, b| self.compare(a, b))
            .cloned()
    }
}
