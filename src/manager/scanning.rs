//! Scan scheduling: base modes, periodic backoff, watchdog and restarts.

use super::ConnectivityManager;
use crate::diag::stats::bump;
use crate::scan::{BackgroundNetwork, BackgroundScanSettings, ScanError, ScanId, ScanMode, ScanSettings, ScanType};
use crate::state::ConnectivityState;
use crate::timer::TimerTag;
use crate::wifi::Band;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

impl ConnectivityManager {
    /// Arm the base scan mode for the current screen and connectivity state.
    ///
    /// With `immediately` false a periodic scan waits until the first
    /// schedule interval has passed since the previous one.
    pub(super) fn start_connectivity_scan(&mut self, now: Instant, immediately: bool) {
        if matches!(
            self.connectivity,
            ConnectivityState::Transitioning | ConnectivityState::Unknown
        ) {
            self.stop_connectivity_scans();
            return;
        }

        if self.screen.is_on() {
            self.timers.cancel(TimerTag::BackgroundRestart);
            self.stop_background_scan();
            self.base_mode = Some(ScanMode::PeriodicForeground);
            self.schedule_kind = self.current_schedule_kind();
            self.start_periodic_scan(now, immediately);
        } else {
            self.timers.cancel(TimerTag::PeriodicScan);
            self.base_mode = Some(ScanMode::BackgroundLowPower);
            let wanted = self.connectivity == ConnectivityState::Disconnected
                || self.config.features.connected_background_scan;
            if !wanted {
                self.stop_background_scan();
            } else if !self.background_active {
                self.start_background_scan(now);
            }
        }
    }

    /// Cancel base-mode scans until connectivity settles.
    pub(super) fn stop_connectivity_scans(&mut self) {
        self.timers.cancel(TimerTag::PeriodicScan);
        self.timers.cancel(TimerTag::BackgroundRestart);
        self.timers.cancel(TimerTag::DelayedPartialScan);
        self.stop_background_scan();
        self.base_mode = None;
    }

    // Foreground periodic

    pub(super) fn start_periodic_scan(&mut self, now: Instant, immediately: bool) {
        self.timers.cancel(TimerTag::PeriodicScan);
        self.cursor.reset();

        if !immediately {
            if let Some(last) = self.last_periodic_scan {
                let due = last + self.periodic_interval(0);
                if now < due {
                    debug!("Periodic scan on schedule in {:?}", due - now);
                    self.timers.schedule(TimerTag::PeriodicScan, due);
                    return;
                }
            }
        }
        self.periodic_scan_tick(now);
    }

    pub(super) fn periodic_scan_tick(&mut self, at: Instant) {
        if self.base_mode != Some(ScanMode::PeriodicForeground) {
            return;
        }

        if self.scan_needed() {
            let scan_type = self.active_schedule().scan_type(self.cursor.get());
            let settings = self.connectivity_scan_settings(ScanMode::PeriodicForeground, scan_type);
            self.issue_scan(settings, at);
            self.last_periodic_scan = Some(at);
        } else {
            bump(&self.stats.scans.skipped);
            debug!("Periodic scan skipped, link is good enough");
        }

        let interval = self.periodic_interval(self.cursor.get());
        self.timers.schedule(TimerTag::PeriodicScan, at + interval);
        self.cursor.advance();
    }

    fn periodic_interval(&self, index: usize) -> Duration {
        let interval = self.active_schedule().interval(index);
        if self.power_save {
            interval.saturating_mul(self.config.power_save_multiplier)
        } else {
            interval
        }
    }

    /// Whether a periodic scan can find anything we would act on.
    fn scan_needed(&self) -> bool {
        if self.connectivity != ConnectivityState::Connected {
            return true;
        }
        if self.wants_secondary() {
            return true;
        }
        match self.link {
            Some(link) => match Band::from_frequency(link.frequency_mhz) {
                Some(band) => link.rssi_dbm < self.config.link.sufficient_rssi_dbm(band),
                None => true,
            },
            None => true,
        }
    }

    /// A secondary session is wanted but not up yet.
    pub(super) fn wants_secondary(&self) -> bool {
        self.secondary_needed && self.secondary.is_none()
    }

    /// Full scan, or a partial one over the primary network's known channels
    /// when connected and roaming is ours to do.
    fn connectivity_scan_settings(&self, mode: ScanMode, scan_type: ScanType) -> ScanSettings {
        if self.connectivity != ConnectivityState::Connected
            || self.config.features.firmware_roaming
            || self.wants_secondary()
        {
            return ScanSettings::full(mode, scan_type);
        }

        let mut channels = BTreeSet::new();
        if let Some(network) = self.sessions.primary().and_then(|s| s.network) {
            if let Some(history) = self.channel_history.get(&network) {
                channels.extend(history.iter().copied());
            }
        }
        if let Some(link) = self.link {
            channels.insert(link.frequency_mhz);
        }
        if channels.is_empty() {
            ScanSettings::full(mode, scan_type)
        } else {
            ScanSettings::partial(mode, scan_type, channels.into_iter().collect())
        }
    }

    // Issuing and restarting

    pub(super) fn issue_scan(&mut self, settings: ScanSettings, now: Instant) {
        let id = ScanId(self.next_scan_id);
        self.next_scan_id += 1;
        bump(&self.stats.scans.started);

        match self.scanner.start_scan(id, &settings) {
            Ok(()) => {
                debug!(
                    "Scan {} started ({}, {:?}, channels {:?})",
                    id, settings.mode, settings.scan_type, settings.channels
                );
                self.pending_scans.insert(id, settings);
            }
            Err(e) => {
                warn!("Scan {} ({}) failed to start: {}", id, settings.mode, e);
                bump(&self.stats.scans.failed);
                self.handle_scan_failure(settings, now);
            }
        }
    }

    pub(super) fn handle_scan_failure(&mut self, settings: ScanSettings, now: Instant) {
        if self.scan_restarts < self.config.max_scan_restarts {
            self.scan_restarts += 1;
            bump(&self.stats.scans.retried);
            debug!(
                "Restarting {} scan in {:?} ({}/{})",
                settings.mode,
                self.config.scan_restart_delay(),
                self.scan_restarts,
                self.config.max_scan_restarts
            );
            self.restarts.retain(|pending| pending.mode != settings.mode);
            self.restarts.push(settings);
            self.timers
                .schedule(TimerTag::ScanRestart, now + self.config.scan_restart_delay());
        } else {
            bump(&self.stats.scans.abandoned);
            self.scan_restarts = 0;
            self.restarts.retain(|pending| pending.mode != settings.mode);
            self.note(
                now,
                format!(
                    "Giving up on {} scan after {} restarts",
                    settings.mode, self.config.max_scan_restarts
                ),
            );
        }
    }

    pub(super) fn restart_failed_scan(&mut self, now: Instant) {
        for settings in std::mem::take(&mut self.restarts) {
            self.issue_scan(settings, now);
        }
    }

    // Watchdog and overlays

    pub(super) fn watchdog_tick(&mut self, at: Instant) {
        if self.connectivity == ConnectivityState::Disconnected {
            self.note(at, "Watchdog scan".to_string());
            self.issue_scan(
                ScanSettings::full(ScanMode::Watchdog, ScanType::HighAccuracy),
                at,
            );
        }
        self.timers
            .schedule(TimerTag::Watchdog, at + self.config.watchdog_interval());
    }

    /// Full high-accuracy scan now; restarts the periodic backoff.
    pub fn force_scan(&mut self, reason: &str, now: Instant) {
        if !self.running {
            debug!("Ignoring forced scan ({}) while stopped", reason);
            return;
        }
        self.note(now, format!("Forced scan: {}", reason));
        self.cursor.reset();
        self.issue_scan(
            ScanSettings::full(ScanMode::Forced, ScanType::HighAccuracy),
            now,
        );

        if self.base_mode == Some(ScanMode::PeriodicForeground) {
            let interval = self.periodic_interval(0);
            self.timers.schedule(TimerTag::PeriodicScan, now + interval);
            self.cursor.advance();
        }
    }

    pub(super) fn delayed_partial_scan(&mut self, now: Instant) {
        if !self.mobility.is_high_movement() {
            return;
        }
        let channels: BTreeSet<u32> = self
            .revalidation_snapshot(now)
            .iter()
            .map(|c| c.frequency_mhz)
            .collect();
        if channels.is_empty() {
            return;
        }
        self.issue_scan(
            ScanSettings::partial(
                ScanMode::DelayedPartial,
                ScanType::LowLatency,
                channels.into_iter().collect(),
            ),
            now,
        );
    }

    // Background low-power

    pub(super) fn start_background_scan(&mut self, now: Instant) {
        let mut ssids = BTreeSet::new();
        for net in self.store.candidate_networks() {
            ssids.insert(net.ssid);
        }
        if ssids.is_empty() {
            debug!("No saved networks, background scan not started");
            return;
        }

        let background = &self.config.background;
        let settings = BackgroundScanSettings {
            interval: self
                .config
                .background_interval(self.mobility.is_stationary()),
            min_rssi_2g_dbm: background.min_rssi_2g_dbm,
            min_rssi_5g_dbm: background.min_rssi_5g_dbm,
            min_rssi_6g_dbm: background.min_rssi_6g_dbm,
            networks: ssids
                .into_iter()
                .map(|ssid| BackgroundNetwork { ssid })
                .collect(),
        };

        match self.scanner.start_background_scan(&settings) {
            Ok(()) => {
                self.background_active = true;
                bump(&self.stats.scans.background);
                debug!(
                    "Background scan started every {:?} for {} networks",
                    settings.interval,
                    settings.networks.len()
                );
            }
            Err(e) => self.handle_background_failure(e, now),
        }
    }

    pub(super) fn stop_background_scan(&mut self) {
        if self.background_active {
            self.scanner.stop_background_scan();
            self.background_active = false;
        }
    }

    pub(super) fn restart_background_scan(&mut self, now: Instant) {
        if self.base_mode != Some(ScanMode::BackgroundLowPower) {
            return;
        }
        self.stop_background_scan();
        if self.connectivity == ConnectivityState::Disconnected
            || self.config.features.connected_background_scan
        {
            self.start_background_scan(now);
        }
    }

    /// Background failures draw on the same restart budget as single scans.
    pub(super) fn handle_background_failure(&mut self, error: ScanError, now: Instant) {
        self.background_active = false;
        warn!("Background scan failed: {}", error);
        bump(&self.stats.scans.failed);

        if self.scan_restarts < self.config.max_scan_restarts {
            self.scan_restarts += 1;
            bump(&self.stats.scans.retried);
            self.timers.schedule(
                TimerTag::BackgroundRestart,
                now + self.config.scan_restart_delay(),
            );
        } else {
            bump(&self.stats.scans.abandoned);
            self.scan_restarts = 0;
            self.note(now, "Giving up on background scan".to_string());
        }
    }
}
