use super::*;
use crate::candidate::StrongestSignalSelector;
use crate::event::FailureCode;
use crate::scan::{ScanDetail, ScanError};
use crate::testing::{FakeScanEngine, FakeSessions, SessionCall, SharedConfigStore};
use crate::wifi::{ConfigStore, NetworkConfig};
use std::sync::atomic::Ordering;
use std::time::Duration;

const OFFICE_A: Bssid = Bssid::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
const OFFICE_B: Bssid = Bssid::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);
const CAFE: Bssid = Bssid::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
const LAB: Bssid = Bssid::new([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
const PRIMARY: SessionId = SessionId(1);

fn net(key: &str, ssid: &str) -> NetworkConfig {
    NetworkConfig::new(key, ssid).unwrap()
}

fn office() -> NetworkConfig {
    net("office", "Office")
}

fn cafe() -> NetworkConfig {
    net("cafe", "Cafe")
}

struct Harness {
    manager: ConnectivityManager,
    scanner: FakeScanEngine,
    sessions: FakeSessions,
    store: SharedConfigStore,
    t0: Instant,
    now_secs: u64,
}

impl Harness {
    fn new(networks: Vec<NetworkConfig>) -> Self {
        Self::with_config(SchedulerConfig::default(), networks)
    }

    fn with_config(config: SchedulerConfig, networks: Vec<NetworkConfig>) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let scanner = FakeScanEngine::new();
        let sessions = FakeSessions::with_primary();
        let store = SharedConfigStore::with_networks(networks);
        let manager = ConnectivityManager::new(
            config,
            Collaborators {
                scanner: Box::new(scanner.clone()),
                sessions: Box::new(sessions.clone()),
                store: Box::new(store.clone()),
                selector: Box::new(StrongestSignalSelector::default()),
            },
            Arc::new(ConnectivityStats::new()),
        )
        .unwrap();
        Self {
            manager,
            scanner,
            sessions,
            store,
            t0: Instant::now(),
            now_secs: 0,
        }
    }

    fn at(&self, secs: u64) -> Instant {
        self.t0 + Duration::from_secs(secs)
    }

    fn now(&self) -> Instant {
        self.at(self.now_secs)
    }

    fn start(&mut self, screen: ScreenState) {
        self.manager.set_screen_state(screen, self.t0);
        self.manager.set_enabled(true, self.t0);
    }

    /// Advance one second at a time; returns the seconds at which scans were issued.
    fn run_until(&mut self, secs: u64) -> Vec<u64> {
        let mut times = Vec::new();
        while self.now_secs < secs {
            self.now_secs += 1;
            let before = self.scanner.scan_count();
            self.manager.advance_to(self.now());
            if self.scanner.scan_count() > before {
                times.push(self.now_secs);
            }
        }
        times
    }

    fn deliver(&mut self, results: Vec<ScanDetail>) {
        let (id, _) = self.scanner.last_scan().expect("no scan issued");
        let now = self.now();
        self.manager
            .handle_event(Event::ScanResults { id, results }, now);
    }

    fn connect_primary_to(&self, network: &NetworkConfig, bssid: Bssid, freq: u32) {
        self.sessions.set_state(
            PRIMARY,
            ConnectivityState::Connected,
            Some((network, bssid, freq)),
        );
    }

    fn fail(&mut self, session: SessionId, code: FailureCode, bssid: Bssid, network: &str) {
        let now = self.now();
        self.manager.handle_event(
            Event::ConnectionAttemptEnded {
                session,
                outcome: AttemptOutcome::Failure(code),
                bssid,
                network: NetworkKey::new(network),
            },
            now,
        );
    }

    fn stat(&self, pick: impl Fn(&ConnectivityStats) -> &std::sync::atomic::AtomicUsize) -> usize {
        pick(&*self.manager.stats).load(Ordering::Relaxed)
    }
}

fn seen(ssid: &str, bssid: Bssid, freq: u32, rssi: i16) -> ScanDetail {
    ScanDetail {
        ssid: ssid.to_string(),
        bssid,
        frequency_mhz: freq,
        rssi_dbm: rssi,
        timestamp: Instant::now(),
    }
}

fn connect_call(session: SessionId, network: &str, bssid: Bssid) -> SessionCall {
    SessionCall::Connect {
        session,
        network: NetworkKey::new(network),
        bssid,
    }
}

// Scheduling

#[test]
fn test_disconnected_backoff_schedule() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::On);
    assert_eq!(h.scanner.scan_count(), 1);
    assert_eq!(h.manager.base_mode(), Some(ScanMode::PeriodicForeground));

    assert_eq!(h.run_until(620), vec![20, 60, 140, 300, 460, 620]);
    assert_eq!(h.manager.backoff_cursor(), 7);
}

#[test]
fn test_power_save_stretches_intervals() {
    let mut h = Harness::new(vec![office()]);
    h.manager.set_power_save(true);
    h.start(ScreenState::On);

    assert_eq!(h.run_until(130), vec![40, 120]);
}

#[test]
fn test_skip_scan_with_good_link() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.manager.on_link_quality(-50, 2412);
    h.start(ScreenState::On);

    h.run_until(20);
    assert_eq!(h.scanner.scan_count(), 0);
    assert_eq!(h.stat(|s| &s.scans.skipped), 2);
    assert_eq!(h.manager.schedule_kind(), ScheduleKind::Connected);
}

#[test]
fn test_weak_link_scans_known_channels() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.manager.on_link_quality(-80, 2412);
    h.start(ScreenState::On);

    let (_, settings) = h.scanner.last_scan().unwrap();
    assert_eq!(settings.channels, Some(vec![2412]));
    assert_eq!(settings.mode, ScanMode::PeriodicForeground);
}

#[test]
fn test_firmware_roaming_scans_all_channels() {
    let mut config = SchedulerConfig::default();
    config.features.firmware_roaming = true;
    let mut h = Harness::with_config(config, vec![office(), cafe()]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.manager.on_link_quality(-80, 2412);
    h.start(ScreenState::On);

    let (_, settings) = h.scanner.last_scan().unwrap();
    assert!(settings.is_full());
}

#[test]
fn test_connected_scan_waits_for_schedule() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.start(ScreenState::On);
    h.run_until(5);
    assert_eq!(h.scanner.scan_count(), 1);

    // Periodic scan at 0, so the connected schedule waits until 20.
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.manager
        .on_session_state_changed(PRIMARY, ConnectivityState::Connected, h.at(5));
    assert_eq!(h.scanner.scan_count(), 1);
    assert_eq!(
        h.manager.timer_deadline(TimerTag::PeriodicScan),
        Some(h.at(20))
    );
    assert_eq!(h.run_until(20), vec![20]);
}

#[test]
fn test_transitioning_stops_scans() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::On);
    h.manager
        .on_session_state_changed(PRIMARY, ConnectivityState::Transitioning, h.at(1));

    assert_eq!(h.manager.base_mode(), None);
    assert!(h.run_until(100).is_empty());

    h.manager
        .on_session_state_changed(PRIMARY, ConnectivityState::Disconnected, h.at(100));
    assert_eq!(h.scanner.scan_count(), 2);
}

#[test]
fn test_force_scan_resets_backoff() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::On);
    assert_eq!(h.run_until(150), vec![20, 60, 140]);

    h.manager.force_scan("user", h.at(150));
    let (_, settings) = h.scanner.last_scan().unwrap();
    assert_eq!(settings.mode, ScanMode::Forced);
    assert!(settings.is_full());

    assert_eq!(h.run_until(230), vec![170, 210]);
}

#[test]
fn test_scan_failure_retry_is_bounded() {
    let mut h = Harness::new(vec![office()]);
    h.scanner.fail_scans(Some(ScanError::Busy));
    h.start(ScreenState::On);

    assert_eq!(h.run_until(19), vec![2, 4, 6, 8, 10]);
    assert_eq!(h.scanner.scan_count(), 6);
    assert_eq!(h.stat(|s| &s.scans.retried), 5);
    assert_eq!(h.stat(|s| &s.scans.abandoned), 1);
    assert!(!h.manager.timers.is_pending(TimerTag::ScanRestart));
}

#[test]
fn test_async_scan_failure_restarts() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::On);
    let (id, _) = h.scanner.last_scan().unwrap();

    h.manager.handle_event(
        Event::ScanFailure {
            id,
            error: ScanError::Aborted,
        },
        h.at(0),
    );
    assert_eq!(h.run_until(2), vec![2]);
}

#[test]
fn test_restarts_are_kept_per_mode() {
    let mut h = Harness::new(vec![office()]);
    h.scanner.fail_scans(Some(ScanError::Busy));
    h.start(ScreenState::On);
    h.manager.force_scan("user", h.at(1));
    h.scanner.fail_scans(None);

    assert_eq!(h.run_until(3), vec![3]);
    let modes: Vec<ScanMode> = h
        .scanner
        .scans()
        .into_iter()
        .skip(2)
        .map(|(_, settings)| settings.mode)
        .collect();
    assert_eq!(modes, vec![ScanMode::PeriodicForeground, ScanMode::Forced]);
}

#[test]
fn test_watchdog_only_while_disconnected() {
    let mut h = Harness::new(vec![]);
    h.start(ScreenState::Off);
    assert_eq!(h.scanner.scan_count(), 0);

    h.run_until(1200);
    let (_, settings) = h.scanner.last_scan().unwrap();
    assert_eq!(settings.mode, ScanMode::Watchdog);
    assert_eq!(h.scanner.scan_count(), 1);

    h.manager
        .on_session_state_changed(PRIMARY, ConnectivityState::Connected, h.at(1300));
    h.now_secs = 1300;
    h.run_until(2400);
    assert_eq!(h.scanner.scan_count(), 1);
    assert_eq!(h.manager.timer_deadline(TimerTag::Watchdog), Some(h.at(3600)));
}

// Background

#[test]
fn test_mobility_change_restarts_background_scan() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::Off);
    assert_eq!(h.manager.base_mode(), Some(ScanMode::BackgroundLowPower));

    h.manager
        .set_mobility_state(MobilityState::Stationary, h.at(5));

    let starts = h.scanner.background_starts();
    assert_eq!(starts.len(), 2);
    assert_eq!(starts[0].interval, Duration::from_secs(20));
    assert_eq!(starts[1].interval, Duration::from_secs(60));
    assert_eq!(starts[1].networks[0].ssid, "Office");
    assert_eq!(h.scanner.background_stops(), 1);
}

#[test]
fn test_config_change_debounces_background_restart() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::Off);

    let change = h.store.upsert(cafe()).unwrap();
    h.manager.on_config_changed(change, h.at(1));
    let change = h.store.upsert(net("home", "Home")).unwrap();
    h.manager.on_config_changed(change, h.at(2));
    assert_eq!(
        h.manager.timer_deadline(TimerTag::BackgroundRestart),
        Some(h.at(3))
    );

    h.run_until(3);
    let starts = h.scanner.background_starts();
    assert_eq!(starts.len(), 2);
    assert_eq!(starts[1].networks.len(), 3);
}

#[test]
fn test_background_results_connect() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::Off);

    h.manager.handle_event(
        Event::BackgroundNetworkFound {
            results: vec![seen("Office", OFFICE_A, 2412, -60)],
        },
        h.at(1),
    );
    assert_eq!(h.sessions.connects(), vec![connect_call(PRIMARY, "office", OFFICE_A)]);
}

#[test]
fn test_screen_on_switches_to_periodic() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::Off);
    h.manager.set_screen_state(ScreenState::On, h.at(5));

    assert_eq!(h.manager.base_mode(), Some(ScanMode::PeriodicForeground));
    assert_eq!(h.scanner.background_stops(), 1);
    assert_eq!(h.scanner.scan_count(), 1);
}

#[test]
fn test_foreground_schedule_shape_change_rescans() {
    let mut h = Harness::new(vec![office()]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.start(ScreenState::On);
    assert_eq!(h.manager.schedule_kind(), ScheduleKind::SingleNetworkConnected);
    assert_eq!(h.scanner.scan_count(), 1);

    let change = h.store.upsert(cafe()).unwrap();
    h.manager.on_config_changed(change, h.at(5));
    assert_eq!(h.manager.schedule_kind(), ScheduleKind::Connected);
    assert_eq!(h.scanner.scan_count(), 2);
}

// Selection and connection

#[test]
fn test_credential_failure_retries_other_network() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.start(ScreenState::On);
    h.deliver(vec![
        seen("Office", OFFICE_A, 2412, -50),
        seen("Office", OFFICE_B, 2437, -60),
        seen("Cafe", CAFE, 2462, -70),
    ]);
    assert_eq!(h.sessions.connects(), vec![connect_call(PRIMARY, "office", OFFICE_A)]);

    h.now_secs = 1;
    h.sessions
        .set_state(PRIMARY, ConnectivityState::Disconnected, None);
    h.fail(PRIMARY, FailureCode::WrongCredentials, OFFICE_A, "office");

    let connects = h.sessions.connects();
    assert_eq!(connects.len(), 2);
    assert_eq!(connects[1], connect_call(PRIMARY, "cafe", CAFE));
    assert_eq!(h.stat(|s| &s.connections.local_retries), 1);
    assert!(h
        .manager
        .blocklist
        .is_blocked(&crate::blocklist::BlockKey::Bssid(OFFICE_A), h.at(1)));
}

#[test]
fn test_no_retry_with_stale_candidates() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.start(ScreenState::On);
    h.deliver(vec![
        seen("Office", OFFICE_A, 2412, -50),
        seen("Cafe", CAFE, 2462, -70),
    ]);

    h.now_secs = 11;
    h.sessions
        .set_state(PRIMARY, ConnectivityState::Disconnected, None);
    h.fail(PRIMARY, FailureCode::Timeout, OFFICE_A, "office");

    assert_eq!(h.sessions.connects().len(), 1);
    assert_eq!(h.stat(|s| &s.connections.local_retries), 0);
}

#[test]
fn test_retry_exhausts_cache() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.start(ScreenState::On);
    h.deliver(vec![
        seen("Office", OFFICE_A, 2412, -50),
        seen("Cafe", CAFE, 2462, -70),
    ]);

    h.now_secs = 1;
    h.sessions
        .set_state(PRIMARY, ConnectivityState::Disconnected, None);
    h.fail(PRIMARY, FailureCode::Timeout, OFFICE_A, "office");
    assert_eq!(h.sessions.connects().len(), 2);

    h.now_secs = 2;
    h.sessions
        .set_state(PRIMARY, ConnectivityState::Disconnected, None);
    h.fail(PRIMARY, FailureCode::Timeout, CAFE, "cafe");
    assert_eq!(h.sessions.connects().len(), 2);
    assert_eq!(h.stat(|s| &s.connections.local_retries), 1);
}

#[test]
fn test_success_clears_candidates() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.start(ScreenState::On);
    h.deliver(vec![seen("Office", OFFICE_A, 2412, -50)]);
    assert!(!h.manager.candidates.is_empty());

    h.manager.handle_event(
        Event::ConnectionAttemptEnded {
            session: PRIMARY,
            outcome: AttemptOutcome::Success,
            bssid: OFFICE_A,
            network: NetworkKey::new("office"),
        },
        h.at(1),
    );
    assert!(h.manager.candidates.is_empty());
}

#[test]
fn test_no_duplicate_connect() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.start(ScreenState::On);
    h.deliver(vec![
        seen("Office", OFFICE_A, 2412, -50),
        seen("Cafe", CAFE, 2462, -70),
    ]);

    assert!(h.sessions.calls().is_empty());
}

#[test]
fn test_same_network_roams() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.start(ScreenState::On);
    h.deliver(vec![
        seen("Office", OFFICE_A, 2412, -75),
        seen("Office", OFFICE_B, 2437, -45),
    ]);

    assert_eq!(
        h.sessions.calls(),
        vec![SessionCall::Roam {
            session: PRIMARY,
            bssid: OFFICE_B
        }]
    );
    assert_eq!(h.stat(|s| &s.connections.roams), 1);
}

#[test]
fn test_rate_limit_in_background() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::Off);

    for i in 1..=7 {
        h.sessions
            .set_state(PRIMARY, ConnectivityState::Disconnected, None);
        h.manager.handle_event(
            Event::BackgroundNetworkFound {
                results: vec![seen("Office", OFFICE_A, 2412, -60)],
            },
            h.at(i),
        );
    }
    assert_eq!(h.sessions.connects().len(), 6);
    assert_eq!(h.stat(|s| &s.connections.rate_limited), 1);

    // The window slides.
    h.sessions
        .set_state(PRIMARY, ConnectivityState::Disconnected, None);
    h.manager.handle_event(
        Event::BackgroundNetworkFound {
            results: vec![seen("Office", OFFICE_A, 2412, -60)],
        },
        h.at(241),
    );
    assert_eq!(h.sessions.connects().len(), 7);
}

#[test]
fn test_rate_limit_waived_in_foreground() {
    let mut config = SchedulerConfig::default();
    config.attempts.max_attempts = 2;
    let mut h = Harness::with_config(config, vec![office()]);
    h.start(ScreenState::On);

    for i in 0..3 {
        h.now_secs = i;
        if i > 0 {
            h.manager.force_scan("test", h.now());
        }
        h.sessions
            .set_state(PRIMARY, ConnectivityState::Disconnected, None);
        h.deliver(vec![seen("Office", OFFICE_A, 2412, -60)]);
    }
    assert_eq!(h.sessions.connects().len(), 3);
    assert_eq!(h.stat(|s| &s.connections.rate_limited), 0);
}

#[test]
fn test_make_before_break_handoff() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.start(ScreenState::On);
    h.deliver(vec![
        seen("Office", OFFICE_A, 2412, -80),
        seen("Cafe", CAFE, 2462, -40),
    ]);
    assert_eq!(
        h.sessions.calls(),
        vec![SessionCall::Request(SessionRole::SecondaryTransient)]
    );

    let granted = h.sessions.grant(SessionRole::SecondaryTransient);
    let new = granted.id;
    h.manager.handle_event(
        Event::SessionGranted {
            role: SessionRole::SecondaryTransient,
            session: Some(granted),
        },
        h.at(1),
    );
    assert_eq!(h.sessions.connects(), vec![connect_call(new, "cafe", CAFE)]);

    h.manager.handle_event(
        Event::SessionStateChanged {
            session: new,
            state: ConnectivityState::Connected,
        },
        h.at(2),
    );
    let calls = h.sessions.calls();
    assert!(calls.contains(&SessionCall::Promote(new)));
    assert!(calls.contains(&SessionCall::Release(PRIMARY)));
    assert!(!calls.contains(&SessionCall::Disconnect(PRIMARY)));
    assert_eq!(h.stat(|s| &s.connections.make_before_break), 1);
    assert_eq!(h.manager.connectivity_state(), ConnectivityState::Connected);
}

#[test]
fn test_failed_handoff_keeps_old_session() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.start(ScreenState::On);
    h.deliver(vec![seen("Cafe", CAFE, 2462, -40)]);

    let granted = h.sessions.grant(SessionRole::SecondaryTransient);
    let new = granted.id;
    h.manager.handle_event(
        Event::SessionGranted {
            role: SessionRole::SecondaryTransient,
            session: Some(granted),
        },
        h.at(1),
    );
    h.fail(new, FailureCode::AssociationRejected, CAFE, "cafe");

    let calls = h.sessions.calls();
    assert!(calls.contains(&SessionCall::Release(new)));
    assert!(!calls.contains(&SessionCall::Release(PRIMARY)));
    assert!(h.manager.handoff.is_none());
}

#[test]
fn test_denied_transient_session_breaks_before_make() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.sessions.deny_requests(true);
    h.start(ScreenState::On);
    h.deliver(vec![seen("Cafe", CAFE, 2462, -40)]);

    assert_eq!(
        h.sessions.calls(),
        vec![
            SessionCall::Request(SessionRole::SecondaryTransient),
            SessionCall::Disconnect(PRIMARY),
            connect_call(PRIMARY, "cafe", CAFE),
        ]
    );
    assert_eq!(h.stat(|s| &s.connections.session_requests_denied), 1);
    assert_eq!(h.stat(|s| &s.connections.break_before_make), 1);
}

#[test]
fn test_fixed_identity_pair_breaks_before_make() {
    let mut office = office();
    office.fixed_identity = true;
    let mut cafe = cafe();
    cafe.fixed_identity = true;
    let mut h = Harness::new(vec![office.clone(), cafe]);
    h.connect_primary_to(&office, OFFICE_A, 2412);
    h.start(ScreenState::On);
    h.deliver(vec![seen("Cafe", CAFE, 2462, -40)]);

    assert_eq!(
        h.sessions.calls(),
        vec![
            SessionCall::Disconnect(PRIMARY),
            connect_call(PRIMARY, "cafe", CAFE),
        ]
    );
}

#[test]
fn test_secondary_connection_on_restricted_network() {
    let mut lab = net("lab", "Lab");
    lab.restricted = true;
    let mut h = Harness::new(vec![office(), lab]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.manager.on_link_quality(-50, 2412);
    h.manager.set_secondary_connection_needed(true, h.t0);
    h.start(ScreenState::On);

    let (_, settings) = h.scanner.last_scan().unwrap();
    assert!(settings.is_full());
    h.deliver(vec![
        seen("Office", OFFICE_A, 2412, -50),
        seen("Lab", LAB, 5180, -60),
    ]);
    assert_eq!(
        h.sessions.calls(),
        vec![SessionCall::Request(SessionRole::SecondaryLongLived)]
    );

    let granted = h.sessions.grant(SessionRole::SecondaryLongLived);
    let id = granted.id;
    h.manager.handle_event(
        Event::SessionGranted {
            role: SessionRole::SecondaryLongLived,
            session: Some(granted),
        },
        h.at(1),
    );
    assert_eq!(h.sessions.connects(), vec![connect_call(id, "lab", LAB)]);
    assert_eq!(h.stat(|s| &s.connections.secondary_connects), 1);

    h.manager.set_secondary_connection_needed(false, h.at(2));
    assert!(h.sessions.calls().contains(&SessionCall::Release(id)));
}

#[test]
fn test_secondary_avoids_primary_band() {
    let mut lab = net("lab", "Lab");
    lab.restricted = true;
    let mut h = Harness::new(vec![office(), lab]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.manager.set_secondary_connection_needed(true, h.t0);
    h.start(ScreenState::On);
    h.deliver(vec![seen("Lab", LAB, 2437, -40)]);

    assert!(h.sessions.calls().is_empty());
}

#[test]
fn test_unrequested_session_is_released() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::On);
    let granted = h.sessions.grant(SessionRole::SecondaryTransient);
    let id = granted.id;
    h.manager.handle_event(
        Event::SessionGranted {
            role: SessionRole::SecondaryTransient,
            session: Some(granted),
        },
        h.at(1),
    );
    assert_eq!(h.sessions.calls(), vec![SessionCall::Release(id)]);
}

#[test]
fn test_primary_loss_drops_pending_handoff() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.start(ScreenState::On);
    h.deliver(vec![
        seen("Office", OFFICE_A, 2412, -80),
        seen("Cafe", CAFE, 2462, -40),
    ]);
    assert_eq!(
        h.sessions.calls(),
        vec![SessionCall::Request(SessionRole::SecondaryTransient)]
    );

    h.now_secs = 5;
    h.sessions
        .set_state(PRIMARY, ConnectivityState::Disconnected, None);
    h.manager
        .on_session_state_changed(PRIMARY, ConnectivityState::Disconnected, h.at(5));
    assert_eq!(h.manager.timer_deadline(TimerTag::SessionRequest), None);

    h.deliver(vec![seen("Cafe", CAFE, 2462, -40)]);
    assert_eq!(h.sessions.connects(), vec![connect_call(PRIMARY, "cafe", CAFE)]);

    let granted = h.sessions.grant(SessionRole::SecondaryTransient);
    let late = granted.id;
    h.manager.handle_event(
        Event::SessionGranted {
            role: SessionRole::SecondaryTransient,
            session: Some(granted),
        },
        h.at(6),
    );
    assert!(h.sessions.calls().contains(&SessionCall::Release(late)));
    assert!(h.manager.handoff.is_none());
}

#[test]
fn test_primary_loss_abandons_handoff_in_flight() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.start(ScreenState::On);
    h.deliver(vec![
        seen("Office", OFFICE_A, 2412, -80),
        seen("Cafe", CAFE, 2462, -40),
    ]);
    let granted = h.sessions.grant(SessionRole::SecondaryTransient);
    let new = granted.id;
    h.manager.handle_event(
        Event::SessionGranted {
            role: SessionRole::SecondaryTransient,
            session: Some(granted),
        },
        h.at(1),
    );
    assert!(h.manager.handoff.is_some());

    h.now_secs = 2;
    h.sessions
        .set_state(PRIMARY, ConnectivityState::Disconnected, None);
    h.manager
        .on_session_state_changed(PRIMARY, ConnectivityState::Disconnected, h.at(2));
    assert!(h.manager.handoff.is_none());
    assert!(h.sessions.calls().contains(&SessionCall::Release(new)));

    h.deliver(vec![seen("Cafe", CAFE, 2462, -40)]);
    assert_eq!(
        h.sessions.connects().last(),
        Some(&connect_call(PRIMARY, "cafe", CAFE))
    );
}

#[test]
fn test_unanswered_transient_request_times_out() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.start(ScreenState::On);
    h.deliver(vec![
        seen("Office", OFFICE_A, 2412, -80),
        seen("Cafe", CAFE, 2462, -40),
    ]);
    assert_eq!(
        h.manager.timer_deadline(TimerTag::SessionRequest),
        Some(h.at(10))
    );

    h.run_until(10);
    assert_eq!(
        h.sessions.calls(),
        vec![
            SessionCall::Request(SessionRole::SecondaryTransient),
            SessionCall::Disconnect(PRIMARY),
            connect_call(PRIMARY, "cafe", CAFE),
        ]
    );
    assert_eq!(h.stat(|s| &s.connections.session_requests_denied), 1);
    assert_eq!(h.stat(|s| &s.connections.break_before_make), 1);
    assert_eq!(h.manager.timer_deadline(TimerTag::SessionRequest), None);
}

#[test]
fn test_lost_secondary_is_requested_again() {
    let mut lab = net("lab", "Lab");
    lab.restricted = true;
    let mut h = Harness::new(vec![office(), lab]);
    h.connect_primary_to(&office(), OFFICE_A, 2412);
    h.manager.on_link_quality(-50, 2412);
    h.manager.set_secondary_connection_needed(true, h.t0);
    h.start(ScreenState::On);
    h.deliver(vec![
        seen("Office", OFFICE_A, 2412, -50),
        seen("Lab", LAB, 5180, -60),
    ]);
    let granted = h.sessions.grant(SessionRole::SecondaryLongLived);
    let id = granted.id;
    h.manager.handle_event(
        Event::SessionGranted {
            role: SessionRole::SecondaryLongLived,
            session: Some(granted),
        },
        h.at(1),
    );

    h.manager.handle_event(
        Event::SessionStateChanged {
            session: id,
            state: ConnectivityState::Disconnected,
        },
        h.at(2),
    );
    assert!(h.sessions.calls().contains(&SessionCall::Release(id)));
    assert!(h.manager.secondary.is_none());

    // Good primary link, but the missing secondary keeps scans going.
    assert_eq!(h.run_until(60), vec![20, 60]);
    h.deliver(vec![
        seen("Office", OFFICE_A, 2412, -50),
        seen("Lab", LAB, 5180, -60),
    ]);
    let requests = h
        .sessions
        .calls()
        .into_iter()
        .filter(|c| *c == SessionCall::Request(SessionRole::SecondaryLongLived))
        .count();
    assert_eq!(requests, 2);
}

#[test]
fn test_stale_snapshot_is_not_compared() {
    let mut h = Harness::new(vec![office()]);
    h.manager
        .set_mobility_state(MobilityState::HighMovement, h.t0);
    h.start(ScreenState::On);
    h.deliver(vec![seen("Office", OFFICE_A, 2412, -50)]);

    h.manager.advance_to(h.at(10));
    let (id, settings) = h.scanner.last_scan().unwrap();
    assert_eq!(settings.mode, ScanMode::DelayedPartial);

    // Results arrive after the snapshot expired: they only refresh it.
    h.manager.handle_event(
        Event::ScanResults {
            id,
            results: vec![seen("Office", OFFICE_A, 2412, -55)],
        },
        h.at(25),
    );
    assert!(h.sessions.connects().is_empty());
    assert_eq!(
        h.manager.timer_deadline(TimerTag::DelayedPartialScan),
        Some(h.at(35))
    );
}

#[test]
fn test_high_mobility_revalidates_before_connecting() {
    let mut h = Harness::new(vec![office()]);
    h.manager
        .set_mobility_state(MobilityState::HighMovement, h.t0);
    h.start(ScreenState::On);
    h.deliver(vec![seen("Office", OFFICE_A, 2412, -50)]);

    assert!(h.sessions.connects().is_empty());
    assert_eq!(
        h.manager.timer_deadline(TimerTag::DelayedPartialScan),
        Some(h.at(10))
    );

    assert_eq!(h.run_until(10), vec![10]);
    let (_, settings) = h.scanner.last_scan().unwrap();
    assert_eq!(settings.mode, ScanMode::DelayedPartial);
    assert_eq!(settings.channels, Some(vec![2412]));

    h.deliver(vec![seen("Office", OFFICE_A, 2412, -55)]);
    assert_eq!(h.sessions.connects(), vec![connect_call(PRIMARY, "office", OFFICE_A)]);
}

#[test]
fn test_leaving_high_mobility_drops_revalidation() {
    let mut h = Harness::new(vec![office()]);
    h.manager
        .set_mobility_state(MobilityState::HighMovement, h.t0);
    h.start(ScreenState::On);
    h.deliver(vec![seen("Office", OFFICE_A, 2412, -50)]);

    h.manager
        .set_mobility_state(MobilityState::LowMovement, h.at(5));
    assert!(!h.manager.timers.is_pending(TimerTag::DelayedPartialScan));
    assert!(h.manager.revalidation.is_empty());
}

#[test]
fn test_repeated_credential_failures_disable_network() {
    let mut h = Harness::new(vec![office(), cafe()]);
    h.start(ScreenState::On);

    for i in 1..=3 {
        h.now_secs = i;
        h.fail(PRIMARY, FailureCode::WrongCredentials, OFFICE_A, "office");
    }
    assert!(!h.store.network(&NetworkKey::new("office")).unwrap().enabled);
    assert!(h.stat(|s| &s.connections.blocklist_additions) >= 1);

    h.now_secs = 310;
    h.manager.force_scan("recheck", h.now());
    h.deliver(vec![]);
    assert!(h.store.network(&NetworkKey::new("office")).unwrap().enabled);
}

// Lifecycle

#[test]
fn test_stop_cancels_everything() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::On);
    let (id, _) = h.scanner.last_scan().unwrap();

    h.manager.set_enabled(false, h.at(5));
    assert!(!h.manager.is_running());
    assert_eq!(h.manager.next_deadline(), None);
    assert!(h.run_until(5000).is_empty());

    h.manager.handle_event(
        Event::ScanResults {
            id,
            results: vec![seen("Office", OFFICE_A, 2412, -50)],
        },
        h.at(5000),
    );
    assert!(h.sessions.calls().is_empty());
}

#[test]
fn test_start_is_idempotent() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::On);
    h.manager.set_enabled(true, h.at(1));
    assert_eq!(h.scanner.scan_count(), 1);
}

#[test]
fn test_split_enable_signal() {
    let mut h = Harness::new(vec![office()]);
    h.manager.set_radio_enabled(true, h.t0);
    assert!(h.manager.is_running());

    h.manager.set_auto_connect_enabled(false, h.at(1));
    assert!(!h.manager.is_running());

    h.manager.set_radio_enabled(false, h.at(2));
    h.manager.set_auto_connect_enabled(true, h.at(3));
    assert!(!h.manager.is_running());

    h.manager
        .handle_event(Command::SetRadioEnabled(true).into(), h.at(4));
    assert!(h.manager.is_running());
}

#[test]
fn test_dump_lists_state() {
    let mut h = Harness::new(vec![office()]);
    h.start(ScreenState::On);
    let dump = h.manager.dump(h.at(1));

    assert!(dump.contains("running: true"));
    assert!(dump.contains("base mode: periodic"));
    assert!(dump.contains("periodic-scan in 19s"));
    assert!(dump.contains("watchdog in"));
    assert!(dump.contains("Started"));
    assert!(dump.contains("\"started\":1"));
}
