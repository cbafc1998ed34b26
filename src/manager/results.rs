//! Scan results: candidates, exclusions and acting on decisions.

use super::decision::{evaluate_scan, Decision, ScanContext};
use super::{ConnectivityManager, RequestPurpose};
use crate::candidate::{build_candidates, ExcludeSet};
use crate::diag::stats::bump;
use crate::scan::{ScanDetail, ScanError, ScanId, ScanMode};
use crate::session::{SessionInfo, SessionRole};
use crate::state::ConnectivityState;
use crate::timer::TimerTag;
use crate::wifi::Band;
use log::{debug, warn};
use std::time::Instant;

impl ConnectivityManager {
    pub(super) fn on_scan_results(&mut self, id: ScanId, results: &[ScanDetail], now: Instant) {
        let Some(settings) = self.pending_scans.remove(&id) else {
            debug!("Ignoring results of unknown scan {}", id);
            return;
        };
        self.scan_restarts = 0;
        self.restarts.retain(|pending| pending.mode != settings.mode);
        if self.restarts.is_empty() {
            self.timers.cancel(TimerTag::ScanRestart);
        }

        debug!("Scan {} ({}) returned {} results", id, settings.mode, results.len());
        self.evaluate(settings.mode, settings.is_full(), results, now);
    }

    pub(super) fn on_scan_failure(&mut self, id: ScanId, error: ScanError, now: Instant) {
        let Some(settings) = self.pending_scans.remove(&id) else {
            debug!("Ignoring failure of unknown scan {}", id);
            return;
        };
        warn!("Scan {} ({}) failed: {}", id, settings.mode, error);
        bump(&self.stats.scans.failed);
        self.handle_scan_failure(settings, now);
    }

    pub(super) fn on_background_results(&mut self, results: &[ScanDetail], now: Instant) {
        if !self.running || self.base_mode != Some(ScanMode::BackgroundLowPower) {
            debug!("Ignoring background results outside background mode");
            return;
        }
        self.scan_restarts = 0;
        self.evaluate(ScanMode::BackgroundLowPower, true, results, now);
    }

    pub(super) fn on_background_failure(&mut self, error: ScanError, now: Instant) {
        if !self.running || !self.background_active {
            return;
        }
        self.handle_background_failure(error, now);
    }

    fn evaluate(&mut self, mode: ScanMode, full: bool, results: &[ScanDetail], now: Instant) {
        for network in self.blocklist.purge_expired(now) {
            if self.store.set_enabled(&network, true) {
                self.note(now, format!("Re-enabled network {}", network));
            }
        }

        let networks = self.store.candidate_networks();
        let candidates = build_candidates(results, &networks);
        for c in &candidates {
            self.channel_history
                .entry(c.network.clone())
                .or_default()
                .insert(c.frequency_mhz);
        }

        let sessions = self.sessions.sessions();
        let primary_exclude = self.primary_exclusions(&sessions, now);
        let secondary_exclude = self
            .secondary_eligible(&sessions)
            .then(|| self.secondary_exclusions(&sessions, now));

        let decision = {
            let ctx = ScanContext {
                mode,
                full,
                high_mobility: self.config.high_mobility.enabled
                    && self.mobility.is_high_movement(),
                rssi_delta_db: self.config.high_mobility.rssi_delta_db,
                previous: self.revalidation_snapshot(now),
                primary_exclude: &primary_exclude,
                secondary_exclude: secondary_exclude.as_ref(),
            };
            evaluate_scan(candidates, &ctx, &*self.selector)
        };
        self.apply_decision(decision, now);
    }

    fn apply_decision(&mut self, decision: Decision, now: Instant) {
        match decision {
            Decision::Revalidate { snapshot } => {
                debug!(
                    "Moving fast, re-validating {} candidates in {:?}",
                    snapshot.len(),
                    self.config.partial_scan_delay()
                );
                self.revalidation = snapshot;
                self.revalidation_at = Some(now);
                self.timers.schedule(
                    TimerTag::DelayedPartialScan,
                    now + self.config.partial_scan_delay(),
                );
            }
            Decision::Select {
                candidates,
                primary,
                secondary,
            } => {
                bump(&self.stats.connections.selections);
                self.candidates.store(candidates, now);
                match primary {
                    Some(target) => self.connect_primary(target, now),
                    None => {
                        bump(&self.stats.connections.no_candidate);
                        debug!("No candidate selected");
                    }
                }
                if let Some(target) = secondary {
                    self.connect_secondary(target, now);
                }
            }
        }
    }

    /// Blocked entries plus networks other sessions already use.
    pub(super) fn primary_exclusions(&self, sessions: &[SessionInfo], now: Instant) -> ExcludeSet {
        let mut exclude = self.blocked(now);
        for session in sessions {
            if session.role != SessionRole::Primary && session.is_busy() {
                if let Some(ssid) = &session.ssid {
                    exclude.ssids.insert(ssid.clone());
                }
            }
        }
        exclude
    }

    /// Blocked entries, every network in use, and the primary's access point.
    fn secondary_exclusions(&self, sessions: &[SessionInfo], now: Instant) -> ExcludeSet {
        let mut exclude = self.blocked(now);
        for session in sessions.iter().filter(|s| s.is_busy()) {
            if let Some(ssid) = &session.ssid {
                exclude.ssids.insert(ssid.clone());
            }
            if session.role != SessionRole::Primary {
                continue;
            }
            if let Some(bssid) = session.bssid {
                exclude.bssids.insert(bssid);
            }
            if self.config.features.secondary_distinct_band {
                let band = session
                    .frequency_mhz
                    .or(self.link.map(|l| l.frequency_mhz))
                    .and_then(Band::from_frequency);
                if let Some(band) = band {
                    exclude.bands.insert(band);
                }
            }
        }
        exclude
    }

    fn blocked(&self, now: Instant) -> ExcludeSet {
        let mut exclude = ExcludeSet::new();
        exclude.bssids.extend(self.blocklist.blocked_bssids(now));
        exclude
            .networks
            .extend(self.blocklist.blocked_networks(now).cloned());
        exclude
    }

    /// A secondary is wanted, none is up or requested, and the primary is connected.
    fn secondary_eligible(&self, sessions: &[SessionInfo]) -> bool {
        self.wants_secondary()
            && !self
                .pending_requests
                .iter()
                .any(|r| matches!(r.purpose, RequestPurpose::Secondary { .. }))
            && sessions
                .iter()
                .any(|s| s.role == SessionRole::Primary && s.state == ConnectivityState::Connected)
    }
}
