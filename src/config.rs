//! # Global runtime configuration.
//!
//! [`Config`] defines the process manager's behavior: the global in-flight
//! cap, where the message-id counter is persisted, the default metering
//! period, and the two grace windows (SIGTERM→SIGKILL escalation and
//! shutdown drain).

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the process manager.
#[derive(Clone, Debug)]
pub struct Config {
    /// Grid id of this node, stamped onto slice commands.
    pub gid: u32,
    /// Node id within the grid.
    pub nid: u32,
    /// Maximum number of concurrently live runners.
    pub max_jobs: usize,
    /// File persisting the monotonic message-id counter.
    pub mid_file: PathBuf,
    /// Default metering period, used when a command does not set `stats_interval`.
    pub stats_interval: Duration,
    /// Maximum time to wait for runners to drain during shutdown.
    pub grace: Duration,
    /// Pause between SIGTERM and SIGKILL on the kill path.
    pub kill_grace: Duration,
    /// Capacity of the direct submission channel.
    pub submit_capacity: usize,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `max_jobs = 100`
    /// - `mid_file = "jobvisor.mid"`
    /// - `stats_interval = 30s`
    /// - `grace = 30s`
    /// - `kill_grace = 2s`
    /// - `submit_capacity = 64`
    fn default() -> Self {
        Self {
            gid: 0,
            nid: 0,
            max_jobs: 100,
            mid_file: PathBuf::from("jobvisor.mid"),
            stats_interval: Duration::from_secs(30),
            grace: Duration::from_secs(30),
            kill_grace: Duration::from_secs(2),
            submit_capacity: 64,
        }
    }
}
