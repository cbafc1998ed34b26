//! Host simulator for the connectivity loop.
//!
//! Runs [`ConnectivityManager`] against a simulated radio: a handful of
//! access points, a scan engine that answers after a short delay, and a
//! supplicant that connects every attempt after a second. Useful to watch
//! scheduling decisions in the log and on the stats endpoint.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin connectivity-sim -- [config.json] [networks.json]
//! curl http://localhost:8080/stats
//! ```

use log::{error, info, warn};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use wifi_connectivity::runtime::{self, ConnectivityHandle, ConnectivityService};
use wifi_connectivity::scan::{
    BackgroundScanSettings, ScanDetail, ScanEngine, ScanError, ScanId, ScanSettings,
};
use wifi_connectivity::session::{
    SessionController, SessionError, SessionId, SessionInfo, SessionRole,
};
use wifi_connectivity::wifi::{Band, Bssid, InMemoryConfigStore, NetworkConfig};
use wifi_connectivity::{
    AttemptOutcome, Collaborators, Command, ConnectivityManager, ConnectivityState,
    ConnectivityStats, Event, SchedulerConfig, ScreenState, StatsServer, StrongestSignalSelector,
    DEFAULT_STATS_PORT,
};

const SCAN_LATENCY: Duration = Duration::from_millis(500);
const CONNECT_LATENCY: Duration = Duration::from_secs(1);
const DUMP_INTERVAL: Duration = Duration::from_secs(60);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Access points visible to the simulated radio.
fn air() -> Vec<(String, Bssid, u32, i16)> {
    vec![
        ("Office".into(), Bssid::new([0x02, 0, 0, 0, 0, 0x01]), 2412, -62),
        ("Office".into(), Bssid::new([0x02, 0, 0, 0, 0, 0x02]), 5180, -58),
        ("Cafe".into(), Bssid::new([0x02, 0, 0, 0, 0, 0x03]), 2437, -71),
        ("Lab".into(), Bssid::new([0x02, 0, 0, 0, 0, 0x04]), 5745, -66),
    ]
}

fn observe(channels: Option<&[u32]>) -> Vec<ScanDetail> {
    let now = Instant::now();
    air()
        .into_iter()
        .filter(|(_, _, freq, _)| channels.map_or(true, |c| c.contains(freq)))
        .map(|(ssid, bssid, frequency_mhz, rssi_dbm)| ScanDetail {
            ssid,
            bssid,
            frequency_mhz,
            rssi_dbm,
            timestamp: now,
        })
        .collect()
}

fn demo_networks() -> InMemoryConfigStore {
    let mut networks = Vec::new();
    for (key, ssid) in [("office", "Office"), ("cafe", "Cafe")] {
        match NetworkConfig::new(key, ssid) {
            Ok(net) => networks.push(net),
            Err(e) => warn!("Skipping demo network {}: {}", key, e),
        }
    }
    InMemoryConfigStore::with_networks(networks)
}

struct SimScanEngine {
    handle: ConnectivityHandle,
    background: Option<JoinHandle<()>>,
}

impl ScanEngine for SimScanEngine {
    fn start_scan(&mut self, id: ScanId, settings: &ScanSettings) -> Result<(), ScanError> {
        let handle = self.handle.clone();
        let channels = settings.channels.clone();
        tokio::spawn(async move {
            tokio::time::sleep(SCAN_LATENCY).await;
            let results = observe(channels.as_deref());
            let _ = handle.send(Event::ScanResults { id, results });
        });
        Ok(())
    }

    fn start_background_scan(
        &mut self,
        settings: &BackgroundScanSettings,
    ) -> Result<(), ScanError> {
        self.stop_background_scan();
        let handle = self.handle.clone();
        let settings = settings.clone();
        self.background = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(settings.interval).await;
                let results: Vec<ScanDetail> = observe(None)
                    .into_iter()
                    .filter(|d| settings.networks.iter().any(|n| n.ssid == d.ssid))
                    .filter(|d| {
                        Band::from_frequency(d.frequency_mhz)
                            .is_some_and(|band| d.rssi_dbm >= settings.min_rssi_dbm(band))
                    })
                    .collect();
                if !results.is_empty()
                    && handle
                        .send(Event::BackgroundNetworkFound { results })
                        .is_err()
                {
                    break;
                }
            }
        }));
        Ok(())
    }

    fn stop_background_scan(&mut self) {
        if let Some(task) = self.background.take() {
            task.abort();
        }
    }
}

/// Supplicant stand-in: grants every request and completes every connect.
struct SimSessions {
    handle: ConnectivityHandle,
    table: Arc<Mutex<BTreeMap<SessionId, SessionInfo>>>,
    next_id: u32,
}

impl SimSessions {
    fn new(handle: ConnectivityHandle) -> Self {
        let mut table = BTreeMap::new();
        table.insert(
            SessionId(1),
            SessionInfo::idle(SessionId(1), SessionRole::Primary),
        );
        Self {
            handle,
            table: Arc::new(Mutex::new(table)),
            next_id: 2,
        }
    }

    fn get_mut<'a>(
        table: &'a mut BTreeMap<SessionId, SessionInfo>,
        id: SessionId,
    ) -> Result<&'a mut SessionInfo, SessionError> {
        table.get_mut(&id).ok_or(SessionError::UnknownSession(id))
    }
}

impl SessionController for SimSessions {
    fn sessions(&self) -> Vec<SessionInfo> {
        lock(&self.table).values().cloned().collect()
    }

    fn request_session(&mut self, role: SessionRole, requestor: &str) -> Result<(), SessionError> {
        let info = SessionInfo::idle(SessionId(self.next_id), role);
        self.next_id += 1;
        info!("{} requested {}, granting {}", requestor, role, info.id);
        lock(&self.table).insert(info.id, info.clone());

        let handle = self.handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = handle.send(Event::SessionGranted {
                role,
                session: Some(info),
            });
        });
        Ok(())
    }

    fn connect(
        &mut self,
        session: SessionId,
        network: &NetworkConfig,
        bssid: Bssid,
    ) -> Result<(), SessionError> {
        let seen = air().into_iter().find(|(_, b, _, _)| *b == bssid);
        let frequency_mhz = seen.as_ref().map(|(_, _, freq, _)| *freq);
        let rssi_dbm = seen.map_or(-90, |(_, _, _, rssi)| rssi);
        {
            let mut table = lock(&self.table);
            let info = Self::get_mut(&mut table, session)?;
            info.state = ConnectivityState::Transitioning;
            info.network = Some(network.key.clone());
            info.ssid = Some(network.ssid.clone());
            info.bssid = Some(bssid);
            info.frequency_mhz = frequency_mhz;
        }
        let _ = self.handle.send(Event::SessionStateChanged {
            session,
            state: ConnectivityState::Transitioning,
        });

        let handle = self.handle.clone();
        let table = self.table.clone();
        let key = network.key.clone();
        tokio::spawn(async move {
            tokio::time::sleep(CONNECT_LATENCY).await;
            let (primary, freq) = {
                let mut table = lock(&table);
                match table.get_mut(&session) {
                    Some(info) if info.bssid == Some(bssid) => {
                        info.state = ConnectivityState::Connected;
                        (info.role == SessionRole::Primary, info.frequency_mhz)
                    }
                    _ => return,
                }
            };
            let _ = handle.send(Event::ConnectionAttemptEnded {
                session,
                outcome: AttemptOutcome::Success,
                bssid,
                network: key,
            });
            let _ = handle.send(Event::SessionStateChanged {
                session,
                state: ConnectivityState::Connected,
            });
            if let (true, Some(frequency_mhz)) = (primary, freq) {
                let _ = handle.send(Event::LinkQuality {
                    rssi_dbm,
                    frequency_mhz,
                });
            }
        });
        Ok(())
    }

    fn roam(&mut self, session: SessionId, bssid: Bssid) -> Result<(), SessionError> {
        let mut table = lock(&self.table);
        let info = Self::get_mut(&mut table, session)?;
        info.bssid = Some(bssid);
        Ok(())
    }

    fn disconnect(&mut self, session: SessionId) -> Result<(), SessionError> {
        {
            let mut table = lock(&self.table);
            let info = Self::get_mut(&mut table, session)?;
            *info = SessionInfo::idle(info.id, info.role);
        }
        let _ = self.handle.send(Event::SessionStateChanged {
            session,
            state: ConnectivityState::Disconnected,
        });
        Ok(())
    }

    fn promote_to_primary(&mut self, session: SessionId) -> Result<(), SessionError> {
        let mut table = lock(&self.table);
        if !table.contains_key(&session) {
            return Err(SessionError::UnknownSession(session));
        }
        for info in table.values_mut() {
            info.role = if info.id == session {
                SessionRole::Primary
            } else if info.role == SessionRole::Primary {
                SessionRole::SecondaryTransient
            } else {
                info.role
            };
        }
        Ok(())
    }

    fn release_session(&mut self, session: SessionId) -> Result<(), SessionError> {
        lock(&self.table)
            .remove(&session)
            .map(|_| ())
            .ok_or(SessionError::UnknownSession(session))
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== Connectivity simulator starting ===");

    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1) {
        Some(path) => match SchedulerConfig::load(Path::new(path)) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => SchedulerConfig::default(),
    };
    let store = match args.get(2) {
        Some(path) => match InMemoryConfigStore::load(Path::new(path)) {
            Ok(store) => store,
            Err(e) => {
                error!("Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => demo_networks(),
    };

    let stats = Arc::new(ConnectivityStats::new());
    let _stats_server = match StatsServer::start(None, DEFAULT_STATS_PORT, stats.clone()) {
        Ok(server) => {
            info!(
                "Stats server running at http://localhost:{}/stats",
                server.port()
            );
            Some(server)
        }
        Err(e) => {
            warn!("Failed to start stats server: {}", e);
            warn!("Continuing without stats server");
            None
        }
    };

    let (handle, inbox) = runtime::channel();
    let collaborators = Collaborators {
        scanner: Box::new(SimScanEngine {
            handle: handle.clone(),
            background: None,
        }),
        sessions: Box::new(SimSessions::new(handle.clone())),
        store: Box::new(store),
        selector: Box::new(StrongestSignalSelector::default()),
    };
    let manager = match ConnectivityManager::new(config, collaborators, stats) {
        Ok(manager) => manager,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let service = ConnectivityService::spawn(manager, inbox);

    let commands = [
        Command::SetScreenState(ScreenState::On),
        Command::SetAutoConnectEnabled(true),
        Command::SetRadioEnabled(true),
    ];
    for command in commands {
        if let Err(e) = handle.send(command) {
            error!("Failed to send command: {}", e);
        }
    }

    info!("Running (Ctrl+C to exit)...");
    let mut dumps = tokio::time::interval(DUMP_INTERVAL);
    dumps.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            _ = dumps.tick() => match handle.dump().await {
                Ok(dump) => info!("\n{}", dump),
                Err(e) => {
                    error!("Service stopped: {}", e);
                    break;
                }
            },
        }
    }

    match service.shutdown().await {
        Ok(manager) => info!("Final state:\n{}", manager.dump(Instant::now())),
        Err(e) => error!("{}", e),
    }
}
