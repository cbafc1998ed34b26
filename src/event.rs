//! Inputs of the connectivity loop.
//!
//! Everything the manager reacts to arrives as one [`Event`], processed in
//! delivery order on a single task. Collaborator callbacks (scan results,
//! session notifications, configuration changes) and host commands share the
//! same queue.

use crate::scan::{ScanDetail, ScanError, ScanId};
use crate::session::{SessionId, SessionInfo, SessionRole};
use crate::state::{ConnectivityState, MobilityState, ScreenState};
use crate::timer::TimerTag;
use crate::wifi::{Bssid, ConfigChange, NetworkKey};
use std::fmt;

/// Why a connection attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    /// Authentication rejected the credentials.
    WrongCredentials,
    /// The access point rejected association.
    AssociationRejected,
    /// No response in time.
    Timeout,
    /// Anything else.
    Other,
}

impl FailureCode {
    /// Whether the failure is a credential failure.
    pub fn is_credential(&self) -> bool {
        matches!(self, Self::WrongCredentials)
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongCredentials => write!(f, "wrong-credentials"),
            Self::AssociationRejected => write!(f, "association-rejected"),
            Self::Timeout => write!(f, "timeout"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Result of a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Associated and provisioned.
    Success,
    /// Attempt failed.
    Failure(FailureCode),
}

/// Host-side control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Combined enable signal.
    SetEnabled(bool),
    /// Radio power.
    SetRadioEnabled(bool),
    /// User auto-connect setting.
    SetAutoConnectEnabled(bool),
    /// Scan now, for the given reason.
    ForceScan(String),
    /// Motion classifier output.
    SetMobilityState(MobilityState),
    /// Foreground indicator.
    SetScreenState(ScreenState),
    /// Power-save mode.
    SetPowerSave(bool),
    /// Whether a secondary uplink is wanted.
    SetSecondaryNeeded(bool),
}

/// One input of the connectivity loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Results of a scan started with `id`.
    ScanResults {
        id: ScanId,
        results: Vec<ScanDetail>,
    },
    /// A scan started with `id` failed after it was issued.
    ScanFailure { id: ScanId, error: ScanError },
    /// The background scan found known networks.
    BackgroundNetworkFound { results: Vec<ScanDetail> },
    /// The background scan stopped with an error.
    BackgroundScanFailure { error: ScanError },
    /// A session changed connectivity.
    SessionStateChanged {
        session: SessionId,
        state: ConnectivityState,
    },
    /// Answer to a session request; `None` means denied.
    SessionGranted {
        role: SessionRole,
        session: Option<SessionInfo>,
    },
    /// A connection attempt on `session` finished.
    ConnectionAttemptEnded {
        session: SessionId,
        outcome: AttemptOutcome,
        bssid: Bssid,
        network: NetworkKey,
    },
    /// Signal report for the primary link.
    LinkQuality { rssi_dbm: i16, frequency_mhz: u32 },
    /// The configuration store changed.
    ConfigChanged(ConfigChange),
    /// An externally driven timer fired.
    Timer(TimerTag),
    /// Host command.
    Command(Command),
}

impl From<Command> for Event {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}
