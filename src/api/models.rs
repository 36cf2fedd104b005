use std::collections::BTreeMap;

use crate::collector::ContainerOverview;
use crate::docker::{ContainerInfo, ContainerState};

/// Health summary served on `/status`.
#[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StatusResponse {
    pub status: Health,
    pub ready: bool,
    pub api_version: String,
    pub error: String,
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    /// Daemon reachable and no daemon call failing.
    Healthy,
    /// Daemon reachable, but some daemon calls failed recently.
    Degraded,
    /// Daemon not reachable.
    Unhealthy,
}

/// One row of `/api/containers`.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ContainerItem {
    pub id: String,
    pub names: Vec<String>,
    pub created: i64,
    pub state: ContainerState,
    pub exited: bool,
    pub exit_code: i64,
    pub restart_count: u64,
    pub mem_usage_kib: u64,
    pub mem_limit_kib: u64,
    /// CPU usage in percent of the host.
    pub cpu_usage: f64,
    pub max_cpus: f64,
    /// CPU usage in percent of the container's CPU limit.
    pub cpu_limited_usage: f64,
    pub max_limited_cpus: f64,
}

impl ContainerItem {
    /// Joins a listed container with whatever of its overview was collected.
    pub fn new(container: &ContainerInfo, overview: Option<&ContainerOverview>) -> Self {
        let mut item = Self {
            id: container.id.to_string(),
            names: container.names.clone(),
            created: container.created,
            state: container.state,
            exited: container.state == ContainerState::Exited,
            exit_code: 0,
            restart_count: 0,
            mem_usage_kib: 0,
            mem_limit_kib: 0,
            cpu_usage: 0.0,
            max_cpus: 0.0,
            cpu_limited_usage: 0.0,
            max_limited_cpus: 0.0,
        };
        let Some(overview) = overview else {
            return item;
        };

        let mut nano_cpus = 0;
        if let Some(inspect) = &overview.inspect {
            item.exit_code = inspect.exit_code;
            item.restart_count = inspect.restart_count;
            nano_cpus = inspect.nano_cpus;
        }
        if let Some(stats) = &overview.stats {
            item.mem_usage_kib = stats.memory_usage_kib;
            item.mem_limit_kib = stats.memory_limit_kib;
            item.cpu_usage = stats.cpu.percent();
            item.max_cpus = f64::from(stats.cpu.online_cpus);
            item.cpu_limited_usage = stats.cpu.limited_percent(nano_cpus);
            item.max_limited_cpus = stats.cpu.max_cpus(nano_cpus);
        }
        item
    }
}
