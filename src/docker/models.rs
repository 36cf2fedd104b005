//! Domain types returned by the daemon facade, and the Engine API payloads
//! they are decoded from.
//!
//! Only the fields the exporter consumes are modelled; everything else in the
//! daemon's JSON is ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::container::ContainerID;

use super::Result;

/// Lifecycle state of a container as reported by the listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Exited,
    Dead,
    Unknown,
}

impl ContainerState {
    pub fn from_api(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            _ => Self::Unknown,
        }
    }

    /// Numeric encoding used by the `docker_container_state` metric.
    pub fn metric_value(self) -> f64 {
        match self {
            Self::Created => 0.0,
            Self::Running => 1.0,
            Self::Paused => 2.0,
            Self::Restarting => 3.0,
            Self::Removing => 4.0,
            Self::Exited => 5.0,
            Self::Dead => 6.0,
            Self::Unknown => -1.0,
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Disk usage of a single container in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContainerSize {
    /// Total size of all files in the container, including image layers.
    pub root_fs: i64,
    /// Size of files created or changed by the container.
    pub rw: i64,
}

/// Container id to disk usage, as loaded by the size cache.
pub type ContainerSizes = HashMap<ContainerID, ContainerSize>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Port {
    pub ip: Option<String>,
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub kind: String,
}

/// One entry of the container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerInfo {
    pub id: ContainerID,
    /// Container names without the leading `/`.
    pub names: Vec<String>,
    pub image_id: String,
    pub command: String,
    pub ports: Vec<Port>,
    pub network_mode: String,
    /// Creation time in UNIX epoch seconds.
    pub created: i64,
    pub state: ContainerState,
    /// Only present when the listing was requested with sizes.
    pub size: Option<ContainerSize>,
}

impl ContainerInfo {
    /// Returns the primary name, falling back to the short id.
    pub fn name(&self) -> &str {
        self.names
            .first()
            .map(String::as_str)
            .unwrap_or_else(|| self.id.short())
    }
}

/// Details from the inspect endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerInspect {
    pub exit_code: i64,
    /// Start time in UNIX epoch seconds, `0` if never started.
    pub started_at: u64,
    /// Finish time in UNIX epoch seconds, `0` if never finished.
    pub finished_at: u64,
    pub restart_count: u64,
    /// CPU limit in units of 10^-9 CPUs, `0` if unlimited.
    pub nano_cpus: i64,
    pub size: Option<ContainerSize>,
}

/// Raw CPU counters needed to compute a `docker stats` style percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuUsage {
    pub total_ns: u64,
    pub pre_total_ns: u64,
    pub system_ns: u64,
    pub pre_system_ns: u64,
    pub online_cpus: u32,
}

impl CpuUsage {
    /// CPU usage since the previous sample in percent of the whole host.
    pub fn percent(&self) -> f64 {
        let cpu_delta = self.total_ns.saturating_sub(self.pre_total_ns);
        let system_delta = self.system_ns.saturating_sub(self.pre_system_ns);
        if system_delta == 0 {
            return 0.0;
        }
        cpu_delta as f64 * 100.0 / system_delta as f64
    }

    /// Number of CPUs available to the container: its `nano_cpus` limit, or all
    /// online CPUs when unlimited.
    pub fn max_cpus(&self, nano_cpus: i64) -> f64 {
        if nano_cpus > 0 {
            nano_cpus as f64 / 1_000_000_000.0
        } else {
            f64::from(self.online_cpus)
        }
    }

    /// [`CpuUsage::percent`] scaled to the container's CPU limit.
    pub fn limited_percent(&self, nano_cpus: i64) -> f64 {
        let max_cpus = self.max_cpus(nano_cpus);
        if max_cpus <= 0.0 {
            return 0.0;
        }
        self.percent() / max_cpus * f64::from(self.online_cpus)
    }
}

/// One-shot resource usage sample of a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContainerStats {
    pub pids: u64,
    pub cpu_user_usec: u64,
    pub cpu_kernel_usec: u64,
    pub cpu: CpuUsage,
    /// Memory usage without the inactive page cache.
    pub memory_usage_kib: u64,
    pub memory_limit_kib: u64,
    pub block_input_bytes: u64,
    pub block_output_bytes: u64,
    pub net_send_bytes: u64,
    pub net_send_errors: u64,
    pub net_send_dropped: u64,
    pub net_recv_bytes: u64,
    pub net_recv_errors: u64,
    pub net_recv_dropped: u64,
}

/// Aggregate disk usage of the daemon in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub containers_total_size: i64,
    pub containers_reclaimable: i64,
    pub images_total_size: i64,
    pub images_reclaimable: i64,
    pub build_cache_total_size: i64,
    pub build_cache_reclaimable: i64,
    pub volumes_total_size: i64,
    pub volumes_reclaimable: i64,
}

/// Converts an RFC 3339 timestamp into UNIX epoch seconds.
///
/// The daemon reports `0001-01-01T00:00:00Z` for events that never happened;
/// that and any unparsable or pre-epoch value map to `0`.
pub fn parse_timestamp(raw: &str) -> u64 {
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .and_then(|ts| u64::try_from(ts.timestamp()).ok())
        .unwrap_or(0)
}

// ---- Engine API payloads ----

#[derive(Debug, Deserialize)]
pub(crate) struct ApiMessage {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawHostConfig {
    #[serde(rename = "NetworkMode")]
    network_mode: String,
    #[serde(rename = "NanoCpus")]
    nano_cpus: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPort {
    #[serde(rename = "IP")]
    ip: Option<String>,
    #[serde(rename = "PrivatePort")]
    private_port: u16,
    #[serde(rename = "PublicPort")]
    public_port: Option<u16>,
    #[serde(rename = "Type", default)]
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawContainerSummary {
    #[serde(rename = "Id")]
    id: String,
    #[serde(default)]
    names: Vec<String>,
    #[serde(rename = "ImageID", default)]
    image_id: String,
    #[serde(default)]
    command: String,
    #[serde(default)]
    ports: Vec<RawPort>,
    #[serde(default)]
    host_config: RawHostConfig,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    state: String,
    size_rw: Option<i64>,
    size_root_fs: Option<i64>,
}

impl RawContainerSummary {
    pub(crate) fn into_info(self) -> Result<ContainerInfo> {
        let size = size_pair(self.size_root_fs, self.size_rw);
        Ok(ContainerInfo {
            id: ContainerID::new(&self.id)?,
            names: self
                .names
                .into_iter()
                .map(|name| name.strip_prefix('/').map(str::to_owned).unwrap_or(name))
                .collect(),
            image_id: self.image_id,
            command: self.command,
            ports: self
                .ports
                .into_iter()
                .map(|port| Port {
                    ip: port.ip.filter(|ip| !ip.is_empty()),
                    private_port: port.private_port,
                    public_port: port.public_port,
                    kind: port.kind,
                })
                .collect(),
            network_mode: self.host_config.network_mode,
            created: self.created,
            state: ContainerState::from_api(&self.state),
            size,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct RawInspectState {
    exit_code: i64,
    started_at: String,
    finished_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawInspect {
    #[serde(default)]
    restart_count: u64,
    #[serde(default)]
    state: RawInspectState,
    #[serde(default)]
    host_config: RawHostConfig,
    size_rw: Option<i64>,
    size_root_fs: Option<i64>,
}

impl From<RawInspect> for ContainerInspect {
    fn from(raw: RawInspect) -> Self {
        Self {
            exit_code: raw.state.exit_code,
            started_at: parse_timestamp(&raw.state.started_at),
            finished_at: parse_timestamp(&raw.state.finished_at),
            restart_count: raw.restart_count,
            nano_cpus: raw.host_config.nano_cpus,
            size: size_pair(raw.size_root_fs, raw.size_rw),
        }
    }
}

fn size_pair(root_fs: Option<i64>, rw: Option<i64>) -> Option<ContainerSize> {
    match (root_fs, rw) {
        (None, None) => None,
        (root_fs, rw) => Some(ContainerSize {
            root_fs: root_fs.unwrap_or(0),
            rw: rw.unwrap_or(0),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawCpuUsage {
    total_usage: u64,
    usage_in_kernelmode: u64,
    usage_in_usermode: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawCpuStats {
    cpu_usage: RawCpuUsage,
    system_cpu_usage: u64,
    online_cpus: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawMemoryStats {
    usage: u64,
    limit: u64,
    stats: HashMap<String, u64>,
}

impl RawMemoryStats {
    /// Page cache that can be reclaimed, for cgroup v2 and v1 respectively.
    fn inactive_file(&self) -> u64 {
        self.stats
            .get("inactive_file")
            .or_else(|| self.stats.get("total_inactive_file"))
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawBlkioEntry {
    op: String,
    value: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawBlkioStats {
    io_service_bytes_recursive: Option<Vec<RawBlkioEntry>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawNetwork {
    rx_bytes: u64,
    rx_errors: u64,
    rx_dropped: u64,
    tx_bytes: u64,
    tx_errors: u64,
    tx_dropped: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawPidsStats {
    current: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct RawStats {
    pids_stats: RawPidsStats,
    cpu_stats: RawCpuStats,
    precpu_stats: RawCpuStats,
    memory_stats: RawMemoryStats,
    blkio_stats: RawBlkioStats,
    networks: Option<HashMap<String, RawNetwork>>,
}

impl From<RawStats> for ContainerStats {
    fn from(raw: RawStats) -> Self {
        let mut stats = ContainerStats {
            pids: raw.pids_stats.current,
            cpu_user_usec: raw.cpu_stats.cpu_usage.usage_in_usermode / 1000,
            cpu_kernel_usec: raw.cpu_stats.cpu_usage.usage_in_kernelmode / 1000,
            cpu: CpuUsage {
                total_ns: raw.cpu_stats.cpu_usage.total_usage,
                pre_total_ns: raw.precpu_stats.cpu_usage.total_usage,
                system_ns: raw.cpu_stats.system_cpu_usage,
                pre_system_ns: raw.precpu_stats.system_cpu_usage,
                online_cpus: raw.cpu_stats.online_cpus,
            },
            memory_usage_kib: raw
                .memory_stats
                .usage
                .saturating_sub(raw.memory_stats.inactive_file())
                / 1024,
            memory_limit_kib: raw.memory_stats.limit / 1024,
            ..Default::default()
        };

        for entry in raw.blkio_stats.io_service_bytes_recursive.unwrap_or_default() {
            if entry.op.eq_ignore_ascii_case("read") {
                stats.block_input_bytes += entry.value;
            } else if entry.op.eq_ignore_ascii_case("write") {
                stats.block_output_bytes += entry.value;
            } else {
                log::trace!("ignoring blkio operation `{}`", entry.op);
            }
        }

        for net in raw.networks.unwrap_or_default().values() {
            stats.net_send_bytes += net.tx_bytes;
            stats.net_send_errors += net.tx_errors;
            stats.net_send_dropped += net.tx_dropped;
            stats.net_recv_bytes += net.rx_bytes;
            stats.net_recv_errors += net.rx_errors;
            stats.net_recv_dropped += net.rx_dropped;
        }

        stats
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct RawDfImage {
    containers: i64,
    size: i64,
    shared_size: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct RawDfContainer {
    size_rw: i64,
    state: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct RawVolumeUsage {
    size: i64,
    ref_count: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct RawDfVolume {
    usage_data: Option<RawVolumeUsage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct RawDfBuildCache {
    size: i64,
    in_use: bool,
    shared: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub(crate) struct RawDiskUsage {
    layers_size: i64,
    images: Option<Vec<RawDfImage>>,
    containers: Option<Vec<RawDfContainer>>,
    volumes: Option<Vec<RawDfVolume>>,
    build_cache: Option<Vec<RawDfBuildCache>>,
}

impl From<RawDiskUsage> for DiskUsage {
    /// Aggregates the `/system/df` listing the way `docker system df` does.
    fn from(raw: RawDiskUsage) -> Self {
        let mut usage = DiskUsage {
            images_total_size: raw.layers_size,
            ..Default::default()
        };

        let used_by_containers: i64 = raw
            .images
            .unwrap_or_default()
            .iter()
            .filter(|image| image.containers > 0)
            .map(|image| image.size - image.shared_size.max(0))
            .sum();
        usage.images_reclaimable = (raw.layers_size - used_by_containers).max(0);

        for container in raw.containers.unwrap_or_default() {
            usage.containers_total_size += container.size_rw;
            if !ContainerState::from_api(&container.state).is_running() {
                usage.containers_reclaimable += container.size_rw;
            }
        }

        for volume in raw.volumes.unwrap_or_default() {
            let Some(data) = volume.usage_data else {
                continue;
            };
            // -1 means the size has not been computed
            if data.size < 0 {
                continue;
            }
            usage.volumes_total_size += data.size;
            if data.ref_count == 0 {
                usage.volumes_reclaimable += data.size;
            }
        }

        for record in raw.build_cache.unwrap_or_default() {
            if record.shared {
                continue;
            }
            usage.build_cache_total_size += record.size;
            if !record.in_use {
                usage.build_cache_reclaimable += record.size;
            }
        }

        usage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("0001-01-01T00:00:00Z"), 0);
        assert_eq!(parse_timestamp("not a time"), 0);
        assert_eq!(parse_timestamp("2024-03-01T12:00:00.123456789Z"), 1_709_294_400);
        assert_eq!(parse_timestamp("2024-03-01T13:00:00+01:00"), 1_709_294_400);
    }

    #[test]
    fn test_decode_container_summary() {
        let data = r#"{
            "Id": "8dfafdbc3a40",
            "Names": ["/boring_feynman", "alias"],
            "ImageID": "sha256:d74508fb6632",
            "Command": "echo 1",
            "Created": 1367854155,
            "State": "Exited",
            "Ports": [{"PrivatePort": 2222, "PublicPort": 3333, "Type": "tcp", "IP": "0.0.0.0"},
                      {"PrivatePort": 53, "Type": "udp", "IP": ""}],
            "HostConfig": {"NetworkMode": "bridge"},
            "SizeRw": 12288,
            "SizeRootFs": 0
        }"#;
        let raw: RawContainerSummary = serde_json::from_str(data).unwrap();
        let info = raw.into_info().unwrap();

        assert_eq!(info.id.as_str(), "8dfafdbc3a40");
        assert_eq!(info.names, vec!["boring_feynman", "alias"]);
        assert_eq!(info.name(), "boring_feynman");
        assert_eq!(info.state, ContainerState::Exited);
        assert_eq!(info.network_mode, "bridge");
        assert_eq!(info.ports.len(), 2);
        assert_eq!(info.ports[0].public_port, Some(3333));
        assert_eq!(info.ports[1].ip, None);
        assert_eq!(
            info.size,
            Some(ContainerSize {
                root_fs: 0,
                rw: 12288
            })
        );
    }

    #[test]
    fn test_decode_container_summary_without_sizes() {
        let data = r#"{"Id": "abc", "Names": [], "State": "running"}"#;
        let info = serde_json::from_str::<RawContainerSummary>(data)
            .unwrap()
            .into_info()
            .unwrap();
        assert_eq!(info.size, None);
        assert_eq!(info.name(), "abc");
        assert!(info.state.is_running());
    }

    #[test]
    fn test_decode_inspect() {
        let data = r#"{
            "RestartCount": 3,
            "State": {
                "ExitCode": 137,
                "StartedAt": "2024-03-01T12:00:00Z",
                "FinishedAt": "0001-01-01T00:00:00Z"
            },
            "HostConfig": {"NanoCpus": 1500000000},
            "SizeRw": 10,
            "SizeRootFs": 2000
        }"#;
        let inspect: ContainerInspect = serde_json::from_str::<RawInspect>(data).unwrap().into();

        assert_eq!(inspect.exit_code, 137);
        assert_eq!(inspect.restart_count, 3);
        assert_eq!(inspect.started_at, 1_709_294_400);
        assert_eq!(inspect.finished_at, 0);
        assert_eq!(inspect.nano_cpus, 1_500_000_000);
        assert_eq!(
            inspect.size,
            Some(ContainerSize {
                root_fs: 2000,
                rw: 10
            })
        );
    }

    #[test]
    fn test_decode_stats() {
        let data = r#"{
            "pids_stats": {"current": 7},
            "cpu_stats": {
                "cpu_usage": {"total_usage": 400000, "usage_in_kernelmode": 150000, "usage_in_usermode": 250000},
                "system_cpu_usage": 2000000,
                "online_cpus": 4
            },
            "precpu_stats": {
                "cpu_usage": {"total_usage": 200000},
                "system_cpu_usage": 1000000
            },
            "memory_stats": {"usage": 10485760, "limit": 2097152000, "stats": {"inactive_file": 2097152}},
            "blkio_stats": {"io_service_bytes_recursive": [
                {"major": 8, "minor": 0, "op": "read", "value": 100},
                {"major": 8, "minor": 0, "op": "Write", "value": 40},
                {"major": 8, "minor": 0, "op": "Total", "value": 140}
            ]},
            "networks": {
                "eth0": {"rx_bytes": 10, "rx_errors": 1, "rx_dropped": 2, "tx_bytes": 20, "tx_errors": 3, "tx_dropped": 4},
                "eth1": {"rx_bytes": 5, "tx_bytes": 6}
            }
        }"#;
        let stats: ContainerStats = serde_json::from_str::<RawStats>(data).unwrap().into();

        assert_eq!(stats.pids, 7);
        assert_eq!(stats.cpu_user_usec, 250);
        assert_eq!(stats.cpu_kernel_usec, 150);
        assert_eq!(stats.memory_usage_kib, 8192);
        assert_eq!(stats.memory_limit_kib, 2_048_000);
        assert_eq!(stats.block_input_bytes, 100);
        assert_eq!(stats.block_output_bytes, 40);
        assert_eq!(stats.net_recv_bytes, 15);
        assert_eq!(stats.net_send_bytes, 26);
        assert_eq!(stats.net_recv_errors, 1);
        assert_eq!(stats.net_send_dropped, 4);
        assert_eq!(stats.cpu.percent(), 20.0);
        assert_eq!(stats.cpu.max_cpus(0), 4.0);
        assert_eq!(stats.cpu.limited_percent(2_000_000_000), 40.0);
    }

    #[test]
    fn test_decode_stats_of_stopped_container() {
        let data = r#"{"blkio_stats": {"io_service_bytes_recursive": null}, "memory_stats": {}}"#;
        let stats: ContainerStats = serde_json::from_str::<RawStats>(data).unwrap().into();
        assert_eq!(stats, ContainerStats::default());
        assert_eq!(stats.cpu.percent(), 0.0);
    }

    #[test]
    fn test_memory_usage_saturates() {
        let data = r#"{"memory_stats": {"usage": 1024, "stats": {"total_inactive_file": 4096}}}"#;
        let stats: ContainerStats = serde_json::from_str::<RawStats>(data).unwrap().into();
        assert_eq!(stats.memory_usage_kib, 0);
    }

    #[test]
    fn test_aggregate_disk_usage() {
        let data = r#"{
            "LayersSize": 1000,
            "Images": [
                {"Containers": 2, "Size": 600, "SharedSize": 100},
                {"Containers": 0, "Size": 300, "SharedSize": 0}
            ],
            "Containers": [
                {"SizeRw": 50, "State": "running"},
                {"SizeRw": 20, "State": "exited"}
            ],
            "Volumes": [
                {"UsageData": {"Size": 70, "RefCount": 1}},
                {"UsageData": {"Size": 30, "RefCount": 0}},
                {"UsageData": {"Size": -1, "RefCount": 0}},
                {}
            ],
            "BuildCache": [
                {"Size": 11, "InUse": true, "Shared": false},
                {"Size": 22, "InUse": false, "Shared": false},
                {"Size": 33, "InUse": false, "Shared": true}
            ]
        }"#;
        let usage: DiskUsage = serde_json::from_str::<RawDiskUsage>(data).unwrap().into();

        assert_eq!(
            usage,
            DiskUsage {
                containers_total_size: 70,
                containers_reclaimable: 20,
                images_total_size: 1000,
                images_reclaimable: 500,
                build_cache_total_size: 33,
                build_cache_reclaimable: 22,
                volumes_total_size: 100,
                volumes_reclaimable: 30,
            }
        );
    }

    #[test]
    fn test_aggregate_empty_disk_usage() {
        let data = r#"{"LayersSize": 0, "Images": null, "Containers": null, "Volumes": null, "BuildCache": null}"#;
        let usage: DiskUsage = serde_json::from_str::<RawDiskUsage>(data).unwrap().into();
        assert_eq!(usage, DiskUsage::default());
    }

    #[test]
    fn test_state_metric_values() {
        assert_eq!(ContainerState::from_api("created").metric_value(), 0.0);
        assert_eq!(ContainerState::from_api("dead").metric_value(), 6.0);
        assert_eq!(ContainerState::from_api("bogus").metric_value(), -1.0);
    }
}
