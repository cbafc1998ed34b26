//! Configuration store seam.
//!
//! The store owns persisted network profiles. The connectivity loop reads
//! candidate networks from it and writes back enable/disable status when a
//! network-level block starts or expires.

use super::{NetworkConfig, NetworkKey};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::path::Path;

/// Read/write access to saved network profiles.
pub trait ConfigStore: Send {
    /// Enabled profiles that auto-connect may choose from.
    fn candidate_networks(&self) -> Vec<NetworkConfig>;

    /// Look up one profile, enabled or not.
    fn network(&self, key: &NetworkKey) -> Option<NetworkConfig>;

    /// Enable or disable a profile. Returns `false` for unknown keys.
    fn set_enabled(&mut self, key: &NetworkKey, enabled: bool) -> bool;

    /// Number of saved profiles, enabled or not.
    fn saved_network_count(&self) -> usize;
}

/// Change notification from the configuration store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    /// A profile was added.
    Added(NetworkKey),
    /// A profile was modified.
    Updated(NetworkKey),
    /// A profile was removed.
    Removed(NetworkKey),
    /// A profile was re-enabled.
    Enabled(NetworkKey),
}

impl ConfigChange {
    /// The profile this change refers to.
    pub fn key(&self) -> &NetworkKey {
        match self {
            Self::Added(k) | Self::Updated(k) | Self::Removed(k) | Self::Enabled(k) => k,
        }
    }
}

/// In-memory profile store, optionally seeded from a JSON array of profiles.
#[derive(Debug, Default, Clone)]
pub struct InMemoryConfigStore {
    networks: BTreeMap<NetworkKey, NetworkConfig>,
}

impl InMemoryConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `networks`. Invalid profiles are skipped.
    pub fn with_networks(networks: impl IntoIterator<Item = NetworkConfig>) -> Self {
        let mut store = Self::new();
        for net in networks {
            store.upsert(net);
        }
        store
    }

    /// Parse a JSON array of profiles.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let networks: Vec<NetworkConfig> = serde_json::from_str(json)?;
        Ok(Self::with_networks(networks))
    }

    /// Load profiles from a JSON file.
    ///
    /// Returns an empty store if the file does not exist.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No network file at {:?}", path);
                return Ok(Self::new());
            }
            Err(e) => return Err(e),
        };
        Self::from_json_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Insert or replace a profile. Returns what the change amounts to.
    pub fn upsert(&mut self, network: NetworkConfig) -> Option<ConfigChange> {
        if let Err(e) = network.validate() {
            warn!("Skipping invalid network {}: {}", network.key, e);
            return None;
        }
        let key = network.key.clone();
        match self.networks.insert(key.clone(), network) {
            Some(_) => Some(ConfigChange::Updated(key)),
            None => Some(ConfigChange::Added(key)),
        }
    }

    /// Remove a profile.
    pub fn remove(&mut self, key: &NetworkKey) -> Option<ConfigChange> {
        self.networks
            .remove(key)
            .map(|_| ConfigChange::Removed(key.clone()))
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn candidate_networks(&self) -> Vec<NetworkConfig> {
        self.networks.values().filter(|n| n.enabled).cloned().collect()
    }

    fn network(&self, key: &NetworkKey) -> Option<NetworkConfig> {
        self.networks.get(key).cloned()
    }

    fn set_enabled(&mut self, key: &NetworkKey, enabled: bool) -> bool {
        match self.networks.get_mut(key) {
            Some(net) => {
                net.enabled = enabled;
                true
            }
            None => false,
        }
    }

    fn saved_network_count(&self) -> usize {
        self.networks.len()
    }
}
