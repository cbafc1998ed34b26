//! Mapping a selected candidate onto a session.
//!
//! # Rules
//!
//! 1. A network pinned to a BSSID is never joined at another one.
//! 2. Already on the same (or a linked) network at the target BSSID: nothing to do.
//! 3. Same network, different BSSID: roam, unless the firmware roams on its own.
//! 4. Linked network: connect on the same session, credentials are shared.
//! 5. Idle session: connect.
//! 6. Connected to a different network: make-before-break through a transient
//!    secondary session, unless both networks need a fixed identity or the
//!    device cannot run two sessions. Then break-before-make on the same session.
//!
//! # Example
//!
//! ```
//! use wifi_connectivity::session::{decide, ArbiterAction, ArbiterPolicy, SessionId, SessionInfo, SessionRole};
//! use wifi_connectivity::wifi::{Bssid, NetworkConfig};
//!
//! let net = NetworkConfig::new("home", "Home").unwrap();
//! let session = SessionInfo::idle(SessionId(1), SessionRole::Primary);
//! let bssid = Bssid::new([0, 1, 2, 3, 4, 5]);
//!
//! let action = decide(&net, bssid, &session, None, &ArbiterPolicy::default());
//! assert_eq!(action, ArbiterAction::Connect { session: SessionId(1) });
//! ```

use super::{SessionId, SessionInfo};
use crate::state::ConnectivityState;
use crate::wifi::{Bssid, NetworkConfig};
use std::fmt;

/// Device capabilities relevant to arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterPolicy {
    /// Firmware roams between BSSIDs of one network on its own.
    pub firmware_roaming: bool,
    /// Transient secondary sessions are available.
    pub make_before_break: bool,
}

impl Default for ArbiterPolicy {
    fn default() -> Self {
        Self {
            firmware_roaming: false,
            make_before_break: true,
        }
    }
}

/// Why nothing needs to happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// Session already on the target network and BSSID.
    AlreadyOnTarget,
    /// Target BSSID is not the one the network is pinned to.
    PinnedBssidMismatch,
    /// Firmware handles roaming within the network.
    FirmwareRoaming,
}

impl fmt::Display for NoOpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyOnTarget => write!(f, "already on target"),
            Self::PinnedBssidMismatch => write!(f, "BSSID does not match pinned BSSID"),
            Self::FirmwareRoaming => write!(f, "firmware roaming"),
        }
    }
}

/// What to do with a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum ArbiterAction {
    /// Nothing.
    NoOp(NoOpReason),
    /// Connect `session` to the target.
    Connect { session: SessionId },
    /// Roam `session` to the target BSSID.
    Roam { session: SessionId },
    /// Bring the target up on a transient session, then drop `old`.
    MakeBeforeBreak { old: SessionId },
    /// Disconnect `session`, then connect it to the target.
    BreakBeforeMake { session: SessionId },
}

impl fmt::Display for ArbiterAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp(reason) => write!(f, "no-op ({})", reason),
            Self::Connect { session } => write!(f, "connect on {}", session),
            Self::Roam { session } => write!(f, "roam on {}", session),
            Self::MakeBeforeBreak { old } => write!(f, "make-before-break from {}", old),
            Self::BreakBeforeMake { session } => write!(f, "break-before-make on {}", session),
        }
    }
}

/// Decide how `session` should reach `target` at `bssid`.
///
/// `current` is the profile of the network the session is on, if known.
pub fn decide(
    target: &NetworkConfig,
    bssid: Bssid,
    session: &SessionInfo,
    current: Option<&NetworkConfig>,
    policy: &ArbiterPolicy,
) -> ArbiterAction {
    if !target.allows_bssid(bssid) {
        return ArbiterAction::NoOp(NoOpReason::PinnedBssidMismatch);
    }

    let current_key = match (&session.network, session.is_busy()) {
        (Some(key), true) => key,
        _ => return ArbiterAction::Connect { session: session.id },
    };

    let same_network = current_key == &target.key;
    let linked = same_network || current.is_some_and(|c| c.is_same_or_linked(target));

    if linked && session.bssid == Some(bssid) {
        return ArbiterAction::NoOp(NoOpReason::AlreadyOnTarget);
    }
    if same_network {
        if policy.firmware_roaming {
            return ArbiterAction::NoOp(NoOpReason::FirmwareRoaming);
        }
        return ArbiterAction::Roam { session: session.id };
    }
    if linked {
        return ArbiterAction::Connect { session: session.id };
    }

    let fixed_identity_pair = target.fixed_identity && current.is_some_and(|c| c.fixed_identity);
    if policy.make_before_break
        && !fixed_identity_pair
        && session.state == ConnectivityState::Connected
    {
        ArbiterAction::MakeBeforeBreak { old: session.id }
    } else {
        ArbiterAction::BreakBeforeMake { session: session.id }
    }
}
