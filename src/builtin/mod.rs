//! # Built-in handlers.
//!
//! In-process commands every node agent answers without configuration:
//! host information and NIC inventory. Registration is explicit: call
//! [`register_builtins`] while wiring the manager, so ordering is obvious
//! and tests stay isolated.

use serde_json::json;
use sysinfo::{Networks, System};

use crate::{
    core::ProcessManager,
    factory::InternalFn,
    jobs::{levels, Command, JobResult, JobState},
};

/// Name of the host information command.
pub const CMD_GET_OS_INFO: &str = "get_os_info";
/// Name of the NIC inventory command.
pub const CMD_GET_NIC_INFO: &str = "get_nic_info";

/// Registers every built-in handler on the manager.
pub fn register_builtins(pm: &ProcessManager) {
    pm.register(
        CMD_GET_OS_INFO,
        InternalFn::arc(|cmd, _ctx| async move { get_os_info(&cmd) }),
    );
    pm.register(
        CMD_GET_NIC_INFO,
        InternalFn::arc(|cmd, _ctx| async move { get_nic_info(&cmd) }),
    );
}

fn get_os_info(cmd: &Command) -> JobResult {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_cpu_list(sysinfo::CpuRefreshKind::new());

    let info = json!({
        "name": System::name(),
        "kernel": System::kernel_version(),
        "version": System::long_os_version(),
        "hostname": System::host_name(),
        "uptime": System::uptime(),
        "boot_time": System::boot_time(),
        "cpus": system.cpus().len(),
        "total_memory": system.total_memory(),
    });

    match serde_json::to_string(&info) {
        Ok(data) => JobResult::new(cmd, JobState::Success)
            .with_data(data)
            .with_level(levels::RESULT_JSON),
        Err(err) => JobResult::new(cmd, JobState::Error).with_data(err.to_string()),
    }
}

fn get_nic_info(cmd: &Command) -> JobResult {
    let networks = Networks::new_with_refreshed_list();
    let nics: Vec<_> = networks
        .iter()
        .map(|(name, data)| {
            json!({
                "name": name,
                "mac": data.mac_address().to_string(),
                "ips": data.ip_networks().iter().map(ToString::to_string).collect::<Vec<_>>(),
                "received": data.total_received(),
                "transmitted": data.total_transmitted(),
            })
        })
        .collect();

    match serde_json::to_string(&nics) {
        Ok(data) => JobResult::new(cmd, JobState::Success)
            .with_data(data)
            .with_level(levels::RESULT_JSON),
        Err(err) => JobResult::new(cmd, JobState::Error).with_data(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_info_reports_success_with_json_payload() {
        let result = get_os_info(&Command::new("j", CMD_GET_OS_INFO));
        assert_eq!(result.state, JobState::Success);
        assert_eq!(result.level, levels::RESULT_JSON);
        let parsed: serde_json::Value = serde_json::from_str(&result.data).unwrap();
        assert!(parsed.get("cpus").is_some());
    }

    #[test]
    fn nic_info_is_a_json_array() {
        let result = get_nic_info(&Command::new("j", CMD_GET_NIC_INFO));
        assert_eq!(result.state, JobState::Success);
        let parsed: serde_json::Value = serde_json::from_str(&result.data).unwrap();
        assert!(parsed.is_array());
    }
}
