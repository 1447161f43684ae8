//! # Per-process resource metering.
//!
//! External runners are sampled every `stats_interval`: CPU percentage,
//! resident set, virtual size and swapped-out bytes, fed as gauges into the
//! job's [`Statsd`] accumulator. Swap is not exposed by the process table
//! and is read from `/proc/<pid>/status` instead.

use std::fs;

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::trace;

use crate::stats::Statsd;

/// Samples one child process into gauge buckets.
pub(crate) struct Meter {
    pid: sysinfo::Pid,
    raw_pid: u32,
    system: System,
}

impl Meter {
    pub(crate) fn new(pid: u32) -> Self {
        Self {
            pid: sysinfo::Pid::from_u32(pid),
            raw_pid: pid,
            system: System::new(),
        }
    }

    /// Takes one sample; silently does nothing once the process is gone.
    pub(crate) fn sample(&mut self, statsd: &Statsd) {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            ProcessRefreshKind::new().with_cpu().with_memory(),
        );

        let Some(process) = self.system.process(self.pid) else {
            trace!(pid = self.raw_pid, "metered process is gone");
            return;
        };

        statsd.gauge("cpu", f64::from(process.cpu_usage()));
        statsd.gauge("rss", process.memory() as f64);
        statsd.gauge("vms", process.virtual_memory() as f64);
        if let Some(swap) = proc_swap_bytes(self.raw_pid) {
            statsd.gauge("swap", swap);
        }
    }
}

/// Reads `VmSwap` from `/proc/<pid>/status`, in bytes.
fn proc_swap_bytes(pid: u32) -> Option<f64> {
    let status = fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    let line = status.lines().find(|l| l.starts_with("VmSwap:"))?;
    let kib = line
        .split_whitespace()
        .nth(1)
        .and_then(|v| v.parse::<f64>().ok())?;
    Some(kib * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_the_current_process_yields_memory_gauges() {
        let mut meter = Meter::new(std::process::id());
        let statsd = Statsd::new("cmd.self");
        meter.sample(&statsd);

        let stats = statsd.flush().expect("no gauges sampled");
        assert!(stats.series["rss"] > 0.0);
        assert!(stats.series["vms"] > 0.0);
    }

    #[test]
    fn a_dead_pid_yields_nothing() {
        let mut meter = Meter::new(u32::MAX - 1);
        let statsd = Statsd::new("cmd.ghost");
        meter.sample(&statsd);
        assert!(statsd.flush().is_none());
    }
}
