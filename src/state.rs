//! Device and link state enums shared across the connectivity loop.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Connectivity of a session (and, for the primary session, of the scheduler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectivityState {
    /// No state reported yet.
    #[default]
    Unknown,
    /// Associated and provisioned.
    Connected,
    /// Not associated.
    Disconnected,
    /// Connecting, roaming or otherwise in between.
    Transitioning,
}

impl ConnectivityState {
    /// Connected or on the way there.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Connected | Self::Transitioning)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Transitioning => write!(f, "transitioning"),
        }
    }
}

/// Device mobility as reported by the motion classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MobilityState {
    /// Not classified.
    #[default]
    Unknown,
    /// Device is not moving.
    Stationary,
    /// Walking pace.
    LowMovement,
    /// Vehicle pace.
    HighMovement,
}

impl MobilityState {
    /// Stationary devices use the long background scan interval.
    pub fn is_stationary(&self) -> bool {
        matches!(self, Self::Stationary)
    }

    /// Whether candidates need re-validation before use.
    pub fn is_high_movement(&self) -> bool {
        matches!(self, Self::HighMovement)
    }
}

impl fmt::Display for MobilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Stationary => write!(f, "stationary"),
            Self::LowMovement => write!(f, "low-movement"),
            Self::HighMovement => write!(f, "high-movement"),
        }
    }
}

/// Display state, the foreground/background indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScreenState {
    /// Device in active use.
    On,
    /// Device idle.
    Off,
}

impl ScreenState {
    /// Whether the device is in foreground use.
    pub fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }
}
