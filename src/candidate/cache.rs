//! Latest candidate set, kept briefly for retries after a failed connection.

use super::Candidate;
use crate::wifi::{Bssid, NetworkKey};
use std::time::{Duration, Instant};

/// Most recent candidate list with the time it was stored.
#[derive(Debug)]
pub struct CandidateCache {
    candidates: Vec<Candidate>,
    stored_at: Option<Instant>,
    validity: Duration,
}

impl CandidateCache {
    /// Create an empty cache whose contents stay usable for `validity`.
    pub fn new(validity: Duration) -> Self {
        Self {
            candidates: Vec::new(),
            stored_at: None,
            validity,
        }
    }

    /// Replace the cached set.
    pub fn store(&mut self, candidates: Vec<Candidate>, now: Instant) {
        self.candidates = candidates;
        self.stored_at = Some(now);
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.candidates.clear();
        self.stored_at = None;
    }

    /// Whether the set was stored less than `validity` ago.
    pub fn is_fresh(&self, now: Instant) -> bool {
        self.stored_at
            .is_some_and(|t| now.saturating_duration_since(t) < self.validity)
    }

    /// Remove the candidate at `bssid`, and every candidate of `network` if given.
    ///
    /// Returns how many candidates were removed.
    pub fn remove_failed(&mut self, bssid: Bssid, network: Option<&NetworkKey>) -> usize {
        let before = self.candidates.len();
        self.candidates
            .retain(|c| c.bssid != bssid && network.map_or(true, |n| &c.network != n));
        before - self.candidates.len()
    }

    /// Remove every candidate of a network that no longer exists.
    pub fn remove_network(&mut self, network: &NetworkKey) {
        self.candidates.retain(|c| &c.network != network);
    }

    /// Cached candidates.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// When the set was stored.
    pub fn stored_at(&self) -> Option<Instant> {
        self.stored_at
    }

    /// Number of cached candidates.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
