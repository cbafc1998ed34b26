//! Diagnostics: counters, the local decision log and the stats endpoint.

mod local_log;
mod server;
pub mod stats;

pub use local_log::LocalLog;
pub use server::{StatsServer, DEFAULT_STATS_PORT};
pub use stats::{ConnectivityStats, StatsSnapshot};
