//! Temporary exclusion of BSSIDs and networks after failures.
//!
//! Failures are counted per BSSID and, for credential failures, per network.
//! A BSSID is blocked once its count reaches a threshold; repeated blocks
//! double in length up to a cap. Counts decay back to zero when no failure is
//! seen for the decay period. A blocked network is also disabled in the
//! configuration store by the caller until its entry expires.
//!
//! Entries never outlive their expiry: [`Blocklist::purge_expired`] runs
//! before every selection pass and reports the networks whose block cleared.

use crate::config::MAX_DURATION_SECS;
use crate::wifi::{Bssid, NetworkKey};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};

/// Blocklist tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlocklistConfig {
    /// Failures on one BSSID before it is blocked.
    pub bssid_failure_threshold: u32,
    /// Length of the first BSSID block.
    pub base_block_secs: u64,
    /// Upper bound on a BSSID block.
    pub max_block_secs: u64,
    /// Quiet period after which failure counts reset.
    pub failure_decay_secs: u64,
    /// Credential failures on one network before it is blocked.
    pub network_auth_failure_threshold: u32,
    /// Length of a network block.
    pub network_block_secs: u64,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            bssid_failure_threshold: 3,
            base_block_secs: 5 * 60,
            max_block_secs: 60 * 60,
            failure_decay_secs: 10 * 60,
            network_auth_failure_threshold: 3,
            network_block_secs: 5 * 60,
        }
    }
}

impl BlocklistConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.bssid_failure_threshold == 0 || self.network_auth_failure_threshold == 0 {
            return Err("blocklist thresholds must be > 0");
        }
        if self.base_block_secs == 0 || self.network_block_secs == 0 {
            return Err("blocklist durations must be > 0");
        }
        if self.max_block_secs < self.base_block_secs {
            return Err("max_block_secs must be >= base_block_secs");
        }
        if self.failure_decay_secs == 0 {
            return Err("failure_decay_secs must be > 0");
        }
        if [self.max_block_secs, self.network_block_secs, self.failure_decay_secs]
            .iter()
            .any(|secs| *secs > MAX_DURATION_SECS)
        {
            return Err("blocklist durations must not exceed one week");
        }
        Ok(())
    }

    /// Block length for the `n`th block past the threshold (0-based).
    fn bssid_block_duration(&self, excess: u32) -> Duration {
        let factor = 1u64.checked_shl(excess.min(32)).unwrap_or(u64::MAX);
        Duration::from_secs(
            self.base_block_secs
                .saturating_mul(factor)
                .min(self.max_block_secs),
        )
    }
}

/// What is blocked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockKey {
    /// One access point.
    Bssid(Bssid),
    /// Every access point of a network.
    Network(NetworkKey),
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bssid(b) => write!(f, "bssid {}", b),
            Self::Network(n) => write!(f, "network {}", n),
        }
    }
}

/// Why an entry was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockReason {
    /// Repeated association or connection failures.
    ConnectionFailures,
    /// Repeated credential failures.
    AuthFailures,
    /// Short hold on a BSSID that just failed, while another candidate is tried.
    RetryHold,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailures => write!(f, "connection-failures"),
            Self::AuthFailures => write!(f, "auth-failures"),
            Self::RetryHold => write!(f, "retry-hold"),
        }
    }
}

/// One active block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlocklistEntry {
    /// Reason for the latest extension.
    pub reason: BlockReason,
    /// When the block lifts.
    pub expiry: Instant,
}

/// What a failure report led to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[must_use]
pub struct FailureVerdict {
    /// The BSSID is now blocked.
    pub bssid_blocked: bool,
    /// The network is now blocked and should be disabled.
    pub network_blocked: bool,
}

#[derive(Debug, Clone, Copy)]
struct FailureCount {
    count: u32,
    last: Instant,
}

impl FailureCount {
    fn bump(&mut self, now: Instant, decay: Duration) -> u32 {
        if now.saturating_duration_since(self.last) >= decay {
            self.count = 0;
        }
        self.count += 1;
        self.last = now;
        self.count
    }
}

/// Temporary exclusion list.
#[derive(Debug)]
pub struct Blocklist {
    config: BlocklistConfig,
    entries: BTreeMap<BlockKey, BlocklistEntry>,
    bssid_failures: HashMap<Bssid, FailureCount>,
    auth_failures: HashMap<NetworkKey, FailureCount>,
}

impl Blocklist {
    /// Create an empty blocklist.
    pub fn new(config: BlocklistConfig) -> Result<Self, &'static str> {
        config.validate()?;
        Ok(Self {
            config,
            entries: BTreeMap::new(),
            bssid_failures: HashMap::new(),
            auth_failures: HashMap::new(),
        })
    }

    /// Block `key` for `duration`. An existing longer block is kept.
    pub fn block(&mut self, key: BlockKey, reason: BlockReason, duration: Duration, now: Instant) {
        let expiry = now + duration;
        match self.entries.get_mut(&key) {
            Some(entry) if entry.expiry >= expiry => {}
            Some(entry) => {
                entry.expiry = expiry;
                entry.reason = reason;
            }
            None => {
                debug!("Blocking {} for {:?} ({})", key, duration, reason);
                self.entries.insert(key, BlocklistEntry { reason, expiry });
            }
        }
    }

    /// Record a failed connection attempt.
    pub fn note_failure(
        &mut self,
        bssid: Bssid,
        network: &NetworkKey,
        credential: bool,
        now: Instant,
    ) -> FailureVerdict {
        let decay = Duration::from_secs(self.config.failure_decay_secs);
        let mut verdict = FailureVerdict::default();

        let count = self
            .bssid_failures
            .entry(bssid)
            .or_insert(FailureCount { count: 0, last: now })
            .bump(now, decay);
        if count >= self.config.bssid_failure_threshold {
            let duration = self
                .config
                .bssid_block_duration(count - self.config.bssid_failure_threshold);
            self.block(
                BlockKey::Bssid(bssid),
                BlockReason::ConnectionFailures,
                duration,
                now,
            );
            verdict.bssid_blocked = true;
        }

        if credential {
            let count = self
                .auth_failures
                .entry(network.clone())
                .or_insert(FailureCount { count: 0, last: now })
                .bump(now, decay);
            if count >= self.config.network_auth_failure_threshold {
                self.auth_failures.remove(network);
                self.block(
                    BlockKey::Network(network.clone()),
                    BlockReason::AuthFailures,
                    Duration::from_secs(self.config.network_block_secs),
                    now,
                );
                info!("Network {} blocked after repeated credential failures", network);
                verdict.network_blocked = true;
            }
        }
        verdict
    }

    /// Record a successful connection; failure counts for both are reset.
    pub fn note_success(&mut self, bssid: Bssid, network: &NetworkKey) {
        self.bssid_failures.remove(&bssid);
        self.auth_failures.remove(network);
    }

    /// Remove expired entries and decayed failure counts. Returns the
    /// networks whose block cleared.
    pub fn purge_expired(&mut self, now: Instant) -> Vec<NetworkKey> {
        let decay = Duration::from_secs(self.config.failure_decay_secs);
        self.bssid_failures
            .retain(|_, f| now.saturating_duration_since(f.last) < decay);
        self.auth_failures
            .retain(|_, f| now.saturating_duration_since(f.last) < decay);

        let mut cleared = Vec::new();
        self.entries.retain(|key, entry| {
            if entry.expiry > now {
                return true;
            }
            debug!("Block on {} expired", key);
            if let BlockKey::Network(network) = key {
                cleared.push(network.clone());
            }
            false
        });
        cleared
    }

    /// Whether `key` is blocked at `now`.
    pub fn is_blocked(&self, key: &BlockKey, now: Instant) -> bool {
        self.entries.get(key).is_some_and(|e| e.expiry > now)
    }

    /// BSSIDs blocked at `now`.
    pub fn blocked_bssids(&self, now: Instant) -> impl Iterator<Item = Bssid> + '_ {
        self.entries.iter().filter_map(move |(key, entry)| match key {
            BlockKey::Bssid(b) if entry.expiry > now => Some(*b),
            _ => None,
        })
    }

    /// Networks blocked at `now`.
    pub fn blocked_networks(&self, now: Instant) -> impl Iterator<Item = &NetworkKey> + '_ {
        self.entries.iter().filter_map(move |(key, entry)| match key {
            BlockKey::Network(n) if entry.expiry > now => Some(n),
            _ => None,
        })
    }

    /// Drop every entry and failure count. Returns the networks that were blocked.
    pub fn clear(&mut self) -> Vec<NetworkKey> {
        let blocked = self
            .entries
            .keys()
            .filter_map(|k| match k {
                BlockKey::Network(n) => Some(n.clone()),
                BlockKey::Bssid(_) => None,
            })
            .collect();
        self.entries.clear();
        self.bssid_failures.clear();
        self.auth_failures.clear();
        blocked
    }

    /// BSSIDs and networks with a live failure count.
    pub fn tracked_failures(&self) -> usize {
        self.bssid_failures.len() + self.auth_failures.len()
    }

    /// Active entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&BlockKey, &BlocklistEntry)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
