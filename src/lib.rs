//! Station-mode Wi-Fi connectivity: scan scheduling, network selection and
//! connection control.
//!
//! The core is [`ConnectivityManager`], a single-owner state machine driven by
//! [`Event`]s and explicit timestamps. Radio scans, interface sessions, saved
//! networks and candidate scoring sit behind traits so the loop can run
//! against real drivers, the host simulator, or the recording fakes in
//! `testing`. [`runtime`] drives the manager on a tokio task.

pub mod attempt;
pub mod blocklist;
pub mod candidate;
pub mod config;
pub mod diag;
pub mod event;
pub mod manager;
pub mod runtime;
pub mod scan;
pub mod session;
pub mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod timer;
pub mod wifi;

// Re-export commonly used items
pub use candidate::{Candidate, NetworkSelector, StrongestSignalSelector};
pub use config::{ConfigError, SchedulerConfig};
pub use diag::{ConnectivityStats, StatsServer, DEFAULT_STATS_PORT};
pub use event::{AttemptOutcome, Command, Event, FailureCode};
pub use manager::{Collaborators, ConnectivityManager, ScheduleKind};
pub use runtime::{ConnectivityHandle, ConnectivityService};
pub use state::{ConnectivityState, MobilityState, ScreenState};
