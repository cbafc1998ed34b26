//! The connectivity manager: scan scheduling, selection and connection control.
//!
//! One [`ConnectivityManager`] owns all scheduler state. It never sleeps and
//! never reads the clock: every entry point takes the current time, and
//! scheduled work is kept in a [`TimerQueue`] that the driver fires through
//! [`ConnectivityManager::advance_to`]. This keeps the whole loop testable on
//! a simulated clock.
//!
//! # Components
//!
//! - [`decision`] - pure scan evaluation shared by every scan mode
//! - `scanning` - periodic, background, watchdog and retry scheduling
//! - `results` - candidate building, exclusions and applying decisions
//! - `connect` - session arbitration, handoffs and failure retries
//! - `dump` - human-readable state dump

pub mod decision;

mod connect;
mod dump;
mod results;
mod scanning;

#[cfg(test)]
mod tests;

pub use decision::{evaluate_scan, Decision, ScanContext};

use crate::attempt::ConnectionAttemptTracker;
use crate::blocklist::Blocklist;
use crate::candidate::{Candidate, CandidateCache, NetworkSelector};
use crate::config::{ConfigError, SchedulerConfig};
use crate::diag::{ConnectivityStats, LocalLog};
use crate::event::{AttemptOutcome, Command, Event};
use crate::scan::{BackoffCursor, ScanEngine, ScanId, ScanMode, ScanSchedule, ScanSettings};
use crate::session::{SessionController, SessionId, SessionRole};
use crate::state::{ConnectivityState, MobilityState, ScreenState};
use crate::timer::{TimerQueue, TimerTag};
use crate::wifi::{Bssid, ConfigChange, ConfigStore, NetworkKey};
use log::{debug, info};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Name used when requesting sessions.
const REQUESTOR: &str = "connectivity-manager";

/// External collaborators of the manager.
pub struct Collaborators {
    /// Radio scans.
    pub scanner: Box<dyn ScanEngine>,
    /// Interface sessions.
    pub sessions: Box<dyn SessionController>,
    /// Saved network profiles.
    pub store: Box<dyn ConfigStore>,
    /// Candidate scorer.
    pub selector: Box<dyn NetworkSelector>,
}

/// Which periodic schedule is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleKind {
    /// Not connected.
    Disconnected,
    /// Connected, several saved networks.
    Connected,
    /// Connected, exactly one saved network.
    SingleNetworkConnected,
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::SingleNetworkConnected => write!(f, "single-network"),
        }
    }
}

#[derive(Debug)]
struct Schedules {
    disconnected: ScanSchedule,
    connected: ScanSchedule,
    single_network: ScanSchedule,
}

#[derive(Debug, Clone, Copy)]
struct LinkQuality {
    rssi_dbm: i16,
    frequency_mhz: u32,
}

/// What an outstanding session request is for.
#[derive(Debug, Clone)]
enum RequestPurpose {
    /// Make-before-break away from `old`.
    Handoff { old: SessionId, target: Candidate },
    /// Long-lived secondary uplink.
    Secondary { target: Candidate },
}

#[derive(Debug, Clone)]
struct PendingRequest {
    role: SessionRole,
    purpose: RequestPurpose,
    requested_at: Instant,
}

/// Make-before-break in progress.
#[derive(Debug, Clone)]
struct Handoff {
    old: SessionId,
    new: SessionId,
    target: Candidate,
}

/// Scan-and-connect control loop.
pub struct ConnectivityManager {
    config: SchedulerConfig,
    schedules: Schedules,
    scanner: Box<dyn ScanEngine>,
    sessions: Box<dyn SessionController>,
    store: Box<dyn ConfigStore>,
    selector: Box<dyn NetworkSelector>,
    stats: Arc<ConnectivityStats>,
    local_log: LocalLog,
    timers: TimerQueue,

    radio_enabled: bool,
    auto_connect_enabled: bool,
    running: bool,

    connectivity: ConnectivityState,
    screen: ScreenState,
    mobility: MobilityState,
    power_save: bool,
    secondary_needed: bool,
    link: Option<LinkQuality>,

    base_mode: Option<ScanMode>,
    schedule_kind: ScheduleKind,
    cursor: BackoffCursor,
    last_periodic_scan: Option<Instant>,
    background_active: bool,

    next_scan_id: u64,
    pending_scans: HashMap<ScanId, ScanSettings>,
    scan_restarts: u32,
    /// Scans waiting for a restart, at most one per mode.
    restarts: Vec<ScanSettings>,

    candidates: CandidateCache,
    revalidation: Vec<Candidate>,
    revalidation_at: Option<Instant>,
    channel_history: HashMap<NetworkKey, BTreeSet<u32>>,
    blocklist: Blocklist,
    attempts: ConnectionAttemptTracker,

    pending_requests: Vec<PendingRequest>,
    handoff: Option<Handoff>,
    secondary: Option<SessionId>,
}

impl ConnectivityManager {
    /// Create a stopped manager.
    ///
    /// Fails if `config` does not validate. Malformed schedules are replaced
    /// by the stock schedule instead.
    pub fn new(
        config: SchedulerConfig,
        collaborators: Collaborators,
        stats: Arc<ConnectivityStats>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let blocklist = Blocklist::new(config.blocklist).map_err(ConfigError::InvalidConfig)?;
        let attempts =
            ConnectionAttemptTracker::new(config.attempts).map_err(ConfigError::InvalidConfig)?;
        let schedules = Schedules {
            disconnected: ScanSchedule::or_default(&config.disconnected_schedule, "disconnected"),
            connected: ScanSchedule::or_default(&config.connected_schedule, "connected"),
            single_network: ScanSchedule::or_default(
                &config.single_network_schedule,
                "single-network",
            ),
        };

        Ok(Self {
            candidates: CandidateCache::new(config.candidate_validity()),
            local_log: LocalLog::new(config.local_log_lines),
            schedules,
            scanner: collaborators.scanner,
            sessions: collaborators.sessions,
            store: collaborators.store,
            selector: collaborators.selector,
            stats,
            timers: TimerQueue::new(),
            radio_enabled: false,
            auto_connect_enabled: true,
            running: false,
            connectivity: ConnectivityState::Unknown,
            screen: ScreenState::Off,
            mobility: MobilityState::Unknown,
            power_save: false,
            secondary_needed: false,
            link: None,
            base_mode: None,
            schedule_kind: ScheduleKind::Disconnected,
            cursor: BackoffCursor::new(),
            last_periodic_scan: None,
            background_active: false,
            next_scan_id: 1,
            pending_scans: HashMap::new(),
            scan_restarts: 0,
            restarts: Vec::new(),
            revalidation: Vec::new(),
            revalidation_at: None,
            channel_history: HashMap::new(),
            blocklist,
            attempts,
            pending_requests: Vec::new(),
            handoff: None,
            secondary: None,
            config,
        })
    }

    // Lifecycle

    /// Start scheduling. Does nothing if already running.
    pub fn start(&mut self, now: Instant) {
        if self.running {
            return;
        }
        self.running = true;
        self.attempts.clear();
        self.candidates.clear();
        self.scan_restarts = 0;
        self.connectivity = self
            .sessions
            .primary()
            .map(|s| s.state)
            .unwrap_or_default();
        self.note(
            now,
            format!(
                "Started: {}, screen {:?}",
                self.connectivity, self.screen
            ),
        );

        self.timers
            .schedule(TimerTag::Watchdog, now + self.config.watchdog_interval());
        self.start_connectivity_scan(now, true);
    }

    /// Stop scheduling and drop every timer, cache and session we hold.
    pub fn stop(&mut self, now: Instant) {
        if !self.running {
            return;
        }
        self.running = false;
        self.timers.cancel_all();
        self.stop_background_scan();
        self.base_mode = None;
        self.cursor.reset();
        self.pending_scans.clear();
        self.restarts.clear();
        self.scan_restarts = 0;
        self.candidates.clear();
        self.clear_revalidation();
        self.attempts.clear();
        for network in self.blocklist.clear() {
            self.store.set_enabled(&network, true);
        }
        if let Some(handoff) = self.handoff.take() {
            self.release(handoff.new);
        }
        if let Some(secondary) = self.secondary.take() {
            self.release(secondary);
        }
        self.pending_requests.clear();
        self.connectivity = ConnectivityState::Unknown;
        self.note(now, "Stopped".to_string());
    }

    /// Combined enable signal: radio powered and auto-connect enabled.
    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        if enabled {
            self.start(now);
        } else {
            self.stop(now);
        }
    }

    /// Radio power changed.
    pub fn set_radio_enabled(&mut self, enabled: bool, now: Instant) {
        self.radio_enabled = enabled;
        self.set_enabled(self.radio_enabled && self.auto_connect_enabled, now);
    }

    /// Auto-connect setting changed.
    pub fn set_auto_connect_enabled(&mut self, enabled: bool, now: Instant) {
        self.auto_connect_enabled = enabled;
        self.set_enabled(self.radio_enabled && self.auto_connect_enabled, now);
    }

    // Device state inputs

    /// Foreground indicator changed.
    pub fn set_screen_state(&mut self, screen: ScreenState, now: Instant) {
        if screen == self.screen {
            return;
        }
        self.screen = screen;
        if self.running {
            self.note(now, format!("Screen {:?}", screen));
            self.start_connectivity_scan(now, true);
        }
    }

    /// Motion classification changed.
    pub fn set_mobility_state(&mut self, mobility: MobilityState, now: Instant) {
        if mobility == self.mobility {
            return;
        }
        let old = std::mem::replace(&mut self.mobility, mobility);
        if self.running {
            self.note(now, format!("Mobility {} -> {}", old, mobility));
        }

        if old.is_high_movement() && !mobility.is_high_movement() {
            self.clear_revalidation();
            self.timers.cancel(TimerTag::DelayedPartialScan);
        }
        if old.is_stationary() != mobility.is_stationary() && self.background_active {
            self.stop_background_scan();
            self.start_background_scan(now);
        }
    }

    /// Power-save mode changed. Takes effect at the next reschedule.
    pub fn set_power_save(&mut self, enabled: bool) {
        self.power_save = enabled;
    }

    /// Whether a long-lived secondary uplink is wanted.
    pub fn set_secondary_connection_needed(&mut self, needed: bool, now: Instant) {
        if needed == self.secondary_needed {
            return;
        }
        self.secondary_needed = needed;
        if needed {
            debug!("Secondary connection requested");
            return;
        }
        self.pending_requests
            .retain(|r| !matches!(r.purpose, RequestPurpose::Secondary { .. }));
        self.rearm_request_timeout();
        if let Some(secondary) = self.secondary.take() {
            self.note(now, format!("Secondary no longer needed, releasing {}", secondary));
            self.release(secondary);
        }
    }

    /// Signal report of the primary link.
    pub fn on_link_quality(&mut self, rssi_dbm: i16, frequency_mhz: u32) {
        self.link = Some(LinkQuality {
            rssi_dbm,
            frequency_mhz,
        });
    }

    /// A session changed connectivity.
    pub fn on_session_state_changed(
        &mut self,
        session: SessionId,
        state: ConnectivityState,
        now: Instant,
    ) {
        if self.handoff.as_ref().is_some_and(|h| h.new == session) {
            match state {
                ConnectivityState::Connected => self.complete_handoff(now),
                ConnectivityState::Disconnected => self.fail_handoff("disconnected", now),
                _ => {}
            }
            return;
        }
        if self.secondary == Some(session) {
            if state == ConnectivityState::Disconnected {
                // Released so the next scan can ask for a new one.
                self.note(now, format!("Secondary {} disconnected, releasing", session));
                self.secondary = None;
                self.release(session);
            }
            return;
        }

        let is_primary = self
            .sessions
            .session(session)
            .is_some_and(|s| s.role == SessionRole::Primary);
        if is_primary {
            if state == ConnectivityState::Disconnected {
                self.abandon_handoff(session, now);
            }
            self.set_connectivity(state, now);
        }
    }

    /// A connection attempt finished.
    pub fn on_connection_attempt_ended(
        &mut self,
        session: SessionId,
        outcome: AttemptOutcome,
        bssid: Bssid,
        network: NetworkKey,
        now: Instant,
    ) {
        if !self.running {
            return;
        }
        self.handle_attempt_ended(session, outcome, bssid, &network, now);
    }

    /// The configuration store changed.
    pub fn on_config_changed(&mut self, change: ConfigChange, now: Instant) {
        if let ConfigChange::Removed(key) = &change {
            self.candidates.remove_network(key);
            self.revalidation.retain(|c| &c.network != key);
            self.channel_history.remove(key);
        }
        if !self.running {
            return;
        }

        match self.base_mode {
            Some(ScanMode::PeriodicForeground) => {
                let kind = self.current_schedule_kind();
                if kind != self.schedule_kind {
                    self.note(
                        now,
                        format!("Schedule {} -> {} after {:?}", self.schedule_kind, kind, change),
                    );
                    self.schedule_kind = kind;
                    self.start_periodic_scan(now, true);
                }
            }
            Some(ScanMode::BackgroundLowPower) => {
                if !self.timers.is_pending(TimerTag::BackgroundRestart) {
                    debug!("Background restart in {:?}", self.config.background_debounce());
                    self.timers.schedule(
                        TimerTag::BackgroundRestart,
                        now + self.config.background_debounce(),
                    );
                }
            }
            _ => {}
        }
    }

    // Event loop entry points

    /// Process one event.
    pub fn handle_event(&mut self, event: Event, now: Instant) {
        match event {
            Event::ScanResults { id, results } => self.on_scan_results(id, &results, now),
            Event::ScanFailure { id, error } => self.on_scan_failure(id, error, now),
            Event::BackgroundNetworkFound { results } => self.on_background_results(&results, now),
            Event::BackgroundScanFailure { error } => self.on_background_failure(error, now),
            Event::SessionStateChanged { session, state } => {
                self.on_session_state_changed(session, state, now)
            }
            Event::SessionGranted { role, session } => self.on_session_granted(role, session, now),
            Event::ConnectionAttemptEnded {
                session,
                outcome,
                bssid,
                network,
            } => self.on_connection_attempt_ended(session, outcome, bssid, network, now),
            Event::LinkQuality {
                rssi_dbm,
                frequency_mhz,
            } => self.on_link_quality(rssi_dbm, frequency_mhz),
            Event::ConfigChanged(change) => self.on_config_changed(change, now),
            Event::Timer(tag) => {
                self.timers.cancel(tag);
                self.on_timer(tag, now);
            }
            Event::Command(command) => self.handle_command(command, now),
        }
    }

    fn handle_command(&mut self, command: Command, now: Instant) {
        match command {
            Command::SetEnabled(enabled) => self.set_enabled(enabled, now),
            Command::SetRadioEnabled(enabled) => self.set_radio_enabled(enabled, now),
            Command::SetAutoConnectEnabled(enabled) => self.set_auto_connect_enabled(enabled, now),
            Command::ForceScan(reason) => self.force_scan(&reason, now),
            Command::SetMobilityState(mobility) => self.set_mobility_state(mobility, now),
            Command::SetScreenState(screen) => self.set_screen_state(screen, now),
            Command::SetPowerSave(enabled) => self.set_power_save(enabled),
            Command::SetSecondaryNeeded(needed) => self.set_secondary_connection_needed(needed, now),
        }
    }

    /// Fire every timer due at or before `now`, each at its own deadline.
    pub fn advance_to(&mut self, now: Instant) {
        while let Some((tag, deadline)) = self.timers.pop_due(now) {
            self.on_timer(tag, deadline);
        }
    }

    /// Earliest pending timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn on_timer(&mut self, tag: TimerTag, now: Instant) {
        if !self.running {
            return;
        }
        match tag {
            TimerTag::PeriodicScan => self.periodic_scan_tick(now),
            TimerTag::Watchdog => self.watchdog_tick(now),
            TimerTag::ScanRestart => self.restart_failed_scan(now),
            TimerTag::BackgroundRestart => self.restart_background_scan(now),
            TimerTag::DelayedPartialScan => self.delayed_partial_scan(now),
            TimerTag::SessionRequest => self.expire_session_requests(now),
        }
    }

    // Connectivity state

    fn set_connectivity(&mut self, state: ConnectivityState, now: Instant) {
        if state == self.connectivity {
            return;
        }
        let old = std::mem::replace(&mut self.connectivity, state);
        if !self.running {
            return;
        }
        self.note(now, format!("Connectivity {} -> {}", old, state));

        match state {
            ConnectivityState::Disconnected => {
                self.link = None;
                self.timers
                    .schedule(TimerTag::Watchdog, now + self.config.watchdog_interval());
                self.start_connectivity_scan(now, true);
            }
            ConnectivityState::Connected => self.start_connectivity_scan(now, false),
            ConnectivityState::Transitioning | ConnectivityState::Unknown => {
                self.stop_connectivity_scans()
            }
        }
    }

    fn current_schedule_kind(&self) -> ScheduleKind {
        match self.connectivity {
            ConnectivityState::Connected if self.store.saved_network_count() == 1 => {
                ScheduleKind::SingleNetworkConnected
            }
            ConnectivityState::Connected => ScheduleKind::Connected,
            _ => ScheduleKind::Disconnected,
        }
    }

    fn active_schedule(&self) -> &ScanSchedule {
        match self.schedule_kind {
            ScheduleKind::Disconnected => &self.schedules.disconnected,
            ScheduleKind::Connected => &self.schedules.connected,
            ScheduleKind::SingleNetworkConnected => &self.schedules.single_network,
        }
    }

    // Helpers

    /// Snapshot of the last high-mobility scan, empty once it is too old to
    /// compare against.
    fn revalidation_snapshot(&self, now: Instant) -> &[Candidate] {
        let fresh = self.revalidation_at.is_some_and(|at| {
            now.saturating_duration_since(at) <= self.config.revalidation_validity()
        });
        if fresh {
            self.revalidation.as_slice()
        } else {
            &[]
        }
    }

    fn clear_revalidation(&mut self) {
        self.revalidation.clear();
        self.revalidation_at = None;
    }

    fn release(&mut self, session: SessionId) {
        if let Err(e) = self.sessions.release_session(session) {
            debug!("Release of {} failed: {}", session, e);
        }
    }

    fn note(&mut self, now: Instant, line: String) {
        info!("{}", line);
        self.local_log.push(now, line);
    }

    // Accessors

    /// Whether the manager is running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Connectivity of the primary session as last seen.
    pub fn connectivity_state(&self) -> ConnectivityState {
        self.connectivity
    }

    /// Active base scan mode.
    pub fn base_mode(&self) -> Option<ScanMode> {
        self.base_mode
    }

    /// Active periodic schedule.
    pub fn schedule_kind(&self) -> ScheduleKind {
        self.schedule_kind
    }

    /// Current backoff index.
    pub fn backoff_cursor(&self) -> usize {
        self.cursor.get()
    }

    /// Deadline of a pending timer.
    pub fn timer_deadline(&self, tag: TimerTag) -> Option<Instant> {
        self.timers.deadline(tag)
    }

    /// Shared counters.
    pub fn stats(&self) -> &Arc<ConnectivityStats> {
        &self.stats
    }

    /// Configuration in use.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}
