//! Human-readable state dump.

use super::ConnectivityManager;
use std::fmt::Write;
use std::time::{Duration, Instant};

fn until(now: Instant, deadline: Instant) -> Duration {
    deadline.saturating_duration_since(now)
}

impl ConnectivityManager {
    /// Describe the whole scheduler state, newest local log lines last.
    pub fn dump(&self, now: Instant) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = self.write_dump(&mut out, now);
        out
    }

    fn write_dump(&self, out: &mut String, now: Instant) -> std::fmt::Result {
        writeln!(out, "Connectivity manager")?;
        writeln!(
            out,
            "  running: {} (radio {}, auto-connect {})",
            self.running, self.radio_enabled, self.auto_connect_enabled
        )?;
        writeln!(
            out,
            "  connectivity: {}, screen: {:?}, mobility: {}, power save: {}",
            self.connectivity, self.screen, self.mobility, self.power_save
        )?;
        match self.base_mode {
            Some(mode) => writeln!(out, "  base mode: {}", mode)?,
            None => writeln!(out, "  base mode: none")?,
        }
        writeln!(
            out,
            "  schedule: {} {}, cursor {}",
            self.schedule_kind,
            self.active_schedule(),
            self.cursor.get()
        )?;
        if let Some(link) = self.link {
            writeln!(
                out,
                "  link: {} dBm on {} MHz",
                link.rssi_dbm, link.frequency_mhz
            )?;
        }
        writeln!(
            out,
            "  background scan: {}, scan restarts: {}/{}",
            if self.background_active { "active" } else { "off" },
            self.scan_restarts,
            self.config.max_scan_restarts
        )?;

        writeln!(out, "Timers:")?;
        for (tag, deadline) in self.timers.iter() {
            writeln!(out, "  {} in {:?}", tag, until(now, deadline))?;
        }

        writeln!(out, "Pending scans:")?;
        let mut ids: Vec<_> = self.pending_scans.keys().copied().collect();
        ids.sort_by_key(|id| id.0);
        for id in ids {
            if let Some(settings) = self.pending_scans.get(&id) {
                writeln!(
                    out,
                    "  {} {} {:?} channels {:?}",
                    id, settings.mode, settings.scan_type, settings.channels
                )?;
            }
        }

        writeln!(
            out,
            "Candidates ({}, {}):",
            self.candidates.len(),
            if self.candidates.is_fresh(now) { "fresh" } else { "stale" }
        )?;
        for c in self.candidates.candidates() {
            writeln!(
                out,
                "  {} {} {} MHz {} dBm",
                c.ssid, c.bssid, c.frequency_mhz, c.rssi_dbm
            )?;
        }
        if !self.revalidation.is_empty() {
            writeln!(out, "Re-validation snapshot: {} candidates", self.revalidation.len())?;
        }

        writeln!(out, "Blocklist:")?;
        for (key, entry) in self.blocklist.iter() {
            writeln!(
                out,
                "  {} ({}) for {:?}",
                key,
                entry.reason,
                until(now, entry.expiry)
            )?;
        }

        writeln!(
            out,
            "Attempts: {}/{} in window, {} rejected",
            self.attempts.len(),
            self.attempts.config().max_attempts,
            self.attempts.rejected_count()
        )?;

        writeln!(out, "Sessions:")?;
        for s in self.sessions.sessions() {
            writeln!(
                out,
                "  {} {} {} {}",
                s.id,
                s.role,
                s.state,
                s.ssid.as_deref().unwrap_or("-")
            )?;
        }
        for request in &self.pending_requests {
            writeln!(
                out,
                "  pending {} request for {:?}",
                request.role,
                now.saturating_duration_since(request.requested_at)
            )?;
        }
        if let Some(handoff) = &self.handoff {
            writeln!(
                out,
                "  handoff {} -> {} for {}",
                handoff.old, handoff.new, handoff.target.ssid
            )?;
        }
        if let Some(secondary) = self.secondary {
            writeln!(out, "  secondary {}", secondary)?;
        }

        writeln!(out, "Stats: {}", self.stats.to_json())?;

        writeln!(out, "Local log:")?;
        for line in self.local_log.lines() {
            writeln!(out, "  {}", line)?;
        }
        Ok(())
    }
}
