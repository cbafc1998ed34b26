//! Recording fakes for the external collaborators.
//!
//! Only built for unit tests or with the `testing` feature, so none of this
//! ends up in a production build. Every fake is a cheap clone around shared
//! state: hand one clone to the manager, keep the other to inspect calls and
//! steer behavior.
//!
//! ```ignore
//! use wifi_connectivity::testing::FakeScanEngine;
//! use wifi_connectivity::scan::{ScanEngine, ScanId, ScanMode, ScanSettings, ScanType};
//!
//! let engine = FakeScanEngine::new();
//! let mut boxed: Box<dyn ScanEngine> = Box::new(engine.clone());
//! boxed
//!     .start_scan(ScanId(1), &ScanSettings::full(ScanMode::Forced, ScanType::HighAccuracy))
//!     .unwrap();
//! assert_eq!(engine.scan_count(), 1);
//! ```

use crate::scan::{BackgroundScanSettings, ScanEngine, ScanError, ScanId, ScanSettings};
use crate::session::{SessionController, SessionError, SessionId, SessionInfo, SessionRole};
use crate::state::ConnectivityState;
use crate::wifi::{Bssid, ConfigChange, ConfigStore, InMemoryConfigStore, NetworkConfig, NetworkKey};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct ScanState {
    scans: Vec<(ScanId, ScanSettings)>,
    background_starts: Vec<BackgroundScanSettings>,
    background_stops: usize,
    fail_scans: Option<ScanError>,
    fail_background: Option<ScanError>,
}

/// Scan engine that records requests and never produces results on its own.
#[derive(Debug, Clone, Default)]
pub struct FakeScanEngine {
    state: Arc<Mutex<ScanState>>,
}

impl FakeScanEngine {
    /// Create an engine that accepts every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `start_scan` fail with `error` (or succeed with `None`).
    pub fn fail_scans(&self, error: Option<ScanError>) {
        lock(&self.state).fail_scans = error;
    }

    /// Make every following background start fail with `error` (or succeed with `None`).
    pub fn fail_background(&self, error: Option<ScanError>) {
        lock(&self.state).fail_background = error;
    }

    /// Every accepted or rejected scan request, in order.
    pub fn scans(&self) -> Vec<(ScanId, ScanSettings)> {
        lock(&self.state).scans.clone()
    }

    /// Number of scan requests.
    pub fn scan_count(&self) -> usize {
        lock(&self.state).scans.len()
    }

    /// The latest scan request.
    pub fn last_scan(&self) -> Option<(ScanId, ScanSettings)> {
        lock(&self.state).scans.last().cloned()
    }

    /// Every background start request.
    pub fn background_starts(&self) -> Vec<BackgroundScanSettings> {
        lock(&self.state).background_starts.clone()
    }

    /// Number of background stops.
    pub fn background_stops(&self) -> usize {
        lock(&self.state).background_stops
    }

    /// Forget recorded requests.
    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.scans.clear();
        state.background_starts.clear();
        state.background_stops = 0;
    }
}

impl ScanEngine for FakeScanEngine {
    fn start_scan(&mut self, id: ScanId, settings: &ScanSettings) -> Result<(), ScanError> {
        let mut state = lock(&self.state);
        state.scans.push((id, settings.clone()));
        match &state.fail_scans {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn start_background_scan(
        &mut self,
        settings: &BackgroundScanSettings,
    ) -> Result<(), ScanError> {
        let mut state = lock(&self.state);
        state.background_starts.push(settings.clone());
        match &state.fail_background {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn stop_background_scan(&mut self) {
        lock(&self.state).background_stops += 1;
    }
}

/// A call made on [`FakeSessions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    /// `request_session`.
    Request(SessionRole),
    /// `connect`.
    Connect {
        session: SessionId,
        network: NetworkKey,
        bssid: Bssid,
    },
    /// `roam`.
    Roam { session: SessionId, bssid: Bssid },
    /// `disconnect`.
    Disconnect(SessionId),
    /// `promote_to_primary`.
    Promote(SessionId),
    /// `release_session`.
    Release(SessionId),
}

#[derive(Debug, Default)]
struct SessionsState {
    sessions: BTreeMap<SessionId, SessionInfo>,
    calls: Vec<SessionCall>,
    next_id: u32,
    deny_requests: bool,
}

/// Session controller backed by a table of fake sessions.
///
/// `connect` and `roam` move the session to `Transitioning` on the target,
/// like a supplicant would; completion is up to the test.
#[derive(Debug, Clone, Default)]
pub struct FakeSessions {
    state: Arc<Mutex<SessionsState>>,
}

impl FakeSessions {
    /// Controller with one idle primary session, `SessionId(1)`.
    pub fn with_primary() -> Self {
        let sessions = Self::default();
        {
            let mut state = lock(&sessions.state);
            state.next_id = 2;
            state.sessions.insert(
                SessionId(1),
                SessionInfo::idle(SessionId(1), SessionRole::Primary),
            );
        }
        sessions
    }

    /// Make `request_session` fail synchronously.
    pub fn deny_requests(&self, deny: bool) {
        lock(&self.state).deny_requests = deny;
    }

    /// Create a session in `role`, as the supplicant would when granting a request.
    pub fn grant(&self, role: SessionRole) -> SessionInfo {
        let mut state = lock(&self.state);
        state.next_id = state.next_id.max(1);
        let id = SessionId(state.next_id);
        state.next_id += 1;
        let info = SessionInfo::idle(id, role);
        state.sessions.insert(id, info.clone());
        info
    }

    /// Set the state of a session and the network it is on.
    pub fn set_state(
        &self,
        id: SessionId,
        state: ConnectivityState,
        network: Option<(&NetworkConfig, Bssid, u32)>,
    ) {
        let mut guard = lock(&self.state);
        if let Some(info) = guard.sessions.get_mut(&id) {
            info.state = state;
            match network {
                Some((net, bssid, freq)) => {
                    info.network = Some(net.key.clone());
                    info.ssid = Some(net.ssid.clone());
                    info.bssid = Some(bssid);
                    info.frequency_mhz = Some(freq);
                }
                None if state == ConnectivityState::Disconnected => {
                    info.network = None;
                    info.ssid = None;
                    info.bssid = None;
                    info.frequency_mhz = None;
                }
                None => {}
            }
        }
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<SessionCall> {
        lock(&self.state).calls.clone()
    }

    /// Connect calls only.
    pub fn connects(&self) -> Vec<SessionCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, SessionCall::Connect { .. }))
            .collect()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }
}

impl SessionController for FakeSessions {
    fn sessions(&self) -> Vec<SessionInfo> {
        lock(&self.state).sessions.values().cloned().collect()
    }

    fn request_session(&mut self, role: SessionRole, _requestor: &str) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        state.calls.push(SessionCall::Request(role));
        if state.deny_requests {
            return Err(SessionError::Unavailable);
        }
        Ok(())
    }

    fn connect(
        &mut self,
        session: SessionId,
        network: &NetworkConfig,
        bssid: Bssid,
    ) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        state.calls.push(SessionCall::Connect {
            session,
            network: network.key.clone(),
            bssid,
        });
        let info = state
            .sessions
            .get_mut(&session)
            .ok_or(SessionError::UnknownSession(session))?;
        info.state = ConnectivityState::Transitioning;
        info.network = Some(network.key.clone());
        info.ssid = Some(network.ssid.clone());
        info.bssid = Some(bssid);
        Ok(())
    }

    fn roam(&mut self, session: SessionId, bssid: Bssid) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        state.calls.push(SessionCall::Roam { session, bssid });
        let info = state
            .sessions
            .get_mut(&session)
            .ok_or(SessionError::UnknownSession(session))?;
        info.bssid = Some(bssid);
        Ok(())
    }

    fn disconnect(&mut self, session: SessionId) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        state.calls.push(SessionCall::Disconnect(session));
        let info = state
            .sessions
            .get_mut(&session)
            .ok_or(SessionError::UnknownSession(session))?;
        info.state = ConnectivityState::Disconnected;
        info.network = None;
        info.ssid = None;
        info.bssid = None;
        info.frequency_mhz = None;
        Ok(())
    }

    fn promote_to_primary(&mut self, session: SessionId) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        state.calls.push(SessionCall::Promote(session));
        if !state.sessions.contains_key(&session) {
            return Err(SessionError::UnknownSession(session));
        }
        for info in state.sessions.values_mut() {
            if info.role == SessionRole::Primary {
                info.role = SessionRole::SecondaryTransient;
            }
        }
        if let Some(info) = state.sessions.get_mut(&session) {
            info.role = SessionRole::Primary;
        }
        Ok(())
    }

    fn release_session(&mut self, session: SessionId) -> Result<(), SessionError> {
        let mut state = lock(&self.state);
        state.calls.push(SessionCall::Release(session));
        state
            .sessions
            .remove(&session)
            .map(|_| ())
            .ok_or(SessionError::UnknownSession(session))
    }
}

/// Configuration store shared between a test and the manager.
#[derive(Debug, Clone, Default)]
pub struct SharedConfigStore {
    inner: Arc<Mutex<InMemoryConfigStore>>,
}

impl SharedConfigStore {
    /// Store holding `networks`.
    pub fn with_networks(networks: impl IntoIterator<Item = NetworkConfig>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(InMemoryConfigStore::with_networks(networks))),
        }
    }

    /// Insert or replace a profile.
    pub fn upsert(&self, network: NetworkConfig) -> Option<ConfigChange> {
        lock(&self.inner).upsert(network)
    }

    /// Remove a profile.
    pub fn remove(&self, key: &NetworkKey) -> Option<ConfigChange> {
        lock(&self.inner).remove(key)
    }
}

impl ConfigStore for SharedConfigStore {
    fn candidate_networks(&self) -> Vec<NetworkConfig> {
        lock(&self.inner).candidate_networks()
    }

    fn network(&self, key: &NetworkKey) -> Option<NetworkConfig> {
        lock(&self.inner).network(key)
    }

    fn set_enabled(&mut self, key: &NetworkKey, enabled: bool) -> bool {
        lock(&self.inner).set_enabled(key, enabled)
    }

    fn saved_network_count(&self) -> usize {
        lock(&self.inner).saved_network_count()
    }
}
