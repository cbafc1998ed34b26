//! Interface sessions and the connect/roam arbiter.
//!
//! A session is a logical uplink on a radio interface in one role. Sessions
//! are owned by the supplicant side; the connectivity loop only requests,
//! drives and releases them through [`SessionController`], and reads their
//! state transiently.
//!
//! Session requests complete asynchronously: [`SessionController::request_session`]
//! only queues the request and the grant (or denial) comes back later as
//! [`crate::Event::SessionGranted`].

pub mod arbiter;

pub use arbiter::{decide, ArbiterAction, ArbiterPolicy, NoOpReason};

use crate::state::ConnectivityState;
use crate::wifi::{Bssid, NetworkConfig, NetworkKey};
use serde::Serialize;
use std::fmt;

/// Role of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SessionRole {
    /// The default internet uplink.
    Primary,
    /// Short-lived session used to make a new connection before breaking the old one.
    SecondaryTransient,
    /// Additional concurrent uplink, typically on another band.
    SecondaryLongLived,
}

impl fmt::Display for SessionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::SecondaryTransient => write!(f, "secondary-transient"),
            Self::SecondaryLongLived => write!(f, "secondary-long-lived"),
        }
    }
}

/// Opaque session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Snapshot of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Handle.
    pub id: SessionId,
    /// Current role.
    pub role: SessionRole,
    /// Connectivity of the session.
    pub state: ConnectivityState,
    /// Network the session is connected or connecting to.
    pub network: Option<NetworkKey>,
    /// SSID of that network.
    pub ssid: Option<String>,
    /// Access point the session is connected or connecting to.
    pub bssid: Option<Bssid>,
    /// Operating frequency in MHz.
    pub frequency_mhz: Option<u32>,
}

impl SessionInfo {
    /// An idle session.
    pub fn idle(id: SessionId, role: SessionRole) -> Self {
        Self {
            id,
            role,
            state: ConnectivityState::Disconnected,
            network: None,
            ssid: None,
            bssid: None,
            frequency_mhz: None,
        }
    }

    /// Whether the session is connected or connecting.
    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }
}

/// Session operation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No session of the requested role can be created.
    Unavailable,
    /// The handle does not refer to a live session.
    UnknownSession(SessionId),
    /// The supplicant refused the operation.
    Rejected(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "session unavailable"),
            Self::UnknownSession(id) => write!(f, "unknown {}", id),
            Self::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

impl std::error::Error for SessionError {}

/// Supplicant-side session operations.
pub trait SessionController: Send {
    /// All live sessions.
    fn sessions(&self) -> Vec<SessionInfo>;

    /// Ask for a new session in `role`. The answer arrives as an event.
    fn request_session(&mut self, role: SessionRole, requestor: &str) -> Result<(), SessionError>;

    /// Connect `session` to `network` at `bssid`.
    fn connect(
        &mut self,
        session: SessionId,
        network: &NetworkConfig,
        bssid: Bssid,
    ) -> Result<(), SessionError>;

    /// Roam `session` to another BSSID of its current network.
    fn roam(&mut self, session: SessionId, bssid: Bssid) -> Result<(), SessionError>;

    /// Disconnect `session`.
    fn disconnect(&mut self, session: SessionId) -> Result<(), SessionError>;

    /// Make `session` the primary uplink.
    fn promote_to_primary(&mut self, session: SessionId) -> Result<(), SessionError>;

    /// Tear down a session obtained through [`Self::request_session`].
    fn release_session(&mut self, session: SessionId) -> Result<(), SessionError>;

    /// The primary session, if any.
    fn primary(&self) -> Option<SessionInfo> {
        self.sessions()
            .into_iter()
            .find(|s| s.role == SessionRole::Primary)
    }

    /// Look up one session.
    fn session(&self, id: SessionId) -> Option<SessionInfo> {
        self.sessions().into_iter().find(|s| s.id == id)
    }
}
