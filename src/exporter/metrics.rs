use prometheus::{CounterVec, GaugeVec, Opts, Registry};

use crate::docker::{ContainerInfo, ContainerInspect, ContainerStats, DiskUsage};
use crate::osinfo::OsInfo;

const CONTAINER: &[&str] = &["container_id"];
const HOST: &[&str] = &["hostname"];

fn gauge(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> prometheus::Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> prometheus::Result<CounterVec> {
    let counter = CounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Host-level series.
#[derive(Debug, Clone)]
pub struct SystemMetrics {
    host_os_info: GaugeVec,
    containers_total: GaugeVec,
    containers_reclaimable: GaugeVec,
    images_total: GaugeVec,
    images_reclaimable: GaugeVec,
    build_cache_total: GaugeVec,
    build_cache_reclaimable: GaugeVec,
    volumes_total: GaugeVec,
    volumes_reclaimable: GaugeVec,
}

impl SystemMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let disk = |kind: &str, what: &str, help: &str| {
            gauge(
                registry,
                &format!("docker_disk_usage_{kind}_{what}_bytes"),
                help,
                HOST,
            )
        };
        Ok(Self {
            host_os_info: gauge(
                registry,
                "docker_host_os_info",
                "Operating system of the docker host",
                &["hostname", "os_name", "os_version"],
            )?,
            containers_total: disk("containers", "total", "Size of all container writable layers")?,
            containers_reclaimable: disk(
                "containers",
                "reclaimable",
                "Size of writable layers of stopped containers",
            )?,
            images_total: disk("images", "total", "Size of all image layers")?,
            images_reclaimable: disk(
                "images",
                "reclaimable",
                "Size of image layers not used by any container",
            )?,
            build_cache_total: disk("build_cache", "total", "Size of the build cache")?,
            build_cache_reclaimable: disk(
                "build_cache",
                "reclaimable",
                "Size of build cache records not in use",
            )?,
            volumes_total: disk("volumes", "total", "Size of all volumes")?,
            volumes_reclaimable: disk(
                "volumes",
                "reclaimable",
                "Size of volumes not referenced by any container",
            )?,
        })
    }

    pub fn observe_host(&self, hostname: &str, os: &OsInfo) {
        self.host_os_info
            .with_label_values(&[hostname, os.name.as_str(), os.version_id.as_str()])
            .set(1.0);
    }

    pub fn observe_disk_usage(&self, hostname: &str, usage: &DiskUsage) {
        let labels = [hostname];
        let series = [
            (&self.containers_total, usage.containers_total_size),
            (&self.containers_reclaimable, usage.containers_reclaimable),
            (&self.images_total, usage.images_total_size),
            (&self.images_reclaimable, usage.images_reclaimable),
            (&self.build_cache_total, usage.build_cache_total_size),
            (&self.build_cache_reclaimable, usage.build_cache_reclaimable),
            (&self.volumes_total, usage.volumes_total_size),
            (&self.volumes_reclaimable, usage.volumes_reclaimable),
        ];
        for (gauge, value) in series {
            gauge.with_label_values(&labels).set(value as f64);
        }
    }
}

/// Series derived from the container listing.
#[derive(Debug, Clone)]
pub struct ListingMetrics {
    info: GaugeVec,
    name: GaugeVec,
    state: GaugeVec,
    created: GaugeVec,
    ports: GaugeVec,
}

impl ListingMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            info: gauge(
                registry,
                "docker_container_info",
                "Container information",
                &["container_id", "name", "image_id", "command", "network_mode"],
            )?,
            name: gauge(
                registry,
                "docker_container_name",
                "Name for the container (can be more than one)",
                &["container_id", "name"],
            )?,
            state: gauge(
                registry,
                "docker_container_state",
                "Container State (0=created, 1=running, 2=paused, 3=restarting, 4=removing, 5=exited, 6=dead)",
                CONTAINER,
            )?,
            created: gauge(
                registry,
                "docker_container_created_seconds",
                "Timestamp in seconds when the container was created",
                CONTAINER,
            )?,
            ports: gauge(
                registry,
                "docker_container_ports",
                "Forwarded ports of the container",
                &["container_id", "public_port", "private_port", "ip", "type"],
            )?,
        })
    }

    pub fn observe(&self, container: &ContainerInfo) {
        let id = container.id.as_str();
        self.info
            .with_label_values(&[
                id,
                container.name(),
                container.image_id.as_str(),
                container.command.as_str(),
                container.network_mode.as_str(),
            ])
            .set(1.0);
        for name in &container.names {
            self.name.with_label_values(&[id, name.as_str()]).set(1.0);
        }
        self.state
            .with_label_values(&[id])
            .set(container.state.metric_value());
        self.created
            .with_label_values(&[id])
            .set(container.created as f64);
        for port in &container.ports {
            let public = port.public_port.map(|p| p.to_string()).unwrap_or_default();
            let private = port.private_port.to_string();
            self.ports
                .with_label_values(&[
                    id,
                    public.as_str(),
                    private.as_str(),
                    port.ip.as_deref().unwrap_or_default(),
                    port.kind.as_str(),
                ])
                .set(1.0);
        }
    }
}

/// Series derived from inspecting a container.
#[derive(Debug, Clone)]
pub struct InspectMetrics {
    started: GaugeVec,
    finished: GaugeVec,
    exit_code: GaugeVec,
    restart_count: GaugeVec,
    rootfs_size: Option<GaugeVec>,
    rw_size: Option<GaugeVec>,
}

impl InspectMetrics {
    pub fn register(registry: &Registry, with_size: bool) -> prometheus::Result<Self> {
        let (rootfs_size, rw_size) = if with_size {
            (
                Some(gauge(
                    registry,
                    "docker_container_rootfs_size_bytes",
                    "Total size of all files in the container",
                    CONTAINER,
                )?),
                Some(gauge(
                    registry,
                    "docker_container_rw_size_bytes",
                    "Size of files created or changed by the container",
                    CONTAINER,
                )?),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            started: gauge(
                registry,
                "docker_container_started_seconds",
                "Timestamp in seconds when the container was started",
                CONTAINER,
            )?,
            finished: gauge(
                registry,
                "docker_container_finished_at_seconds",
                "Timestamp in seconds when the container finished",
                CONTAINER,
            )?,
            exit_code: gauge(
                registry,
                "docker_container_exit_code",
                "Exit code of the container",
                CONTAINER,
            )?,
            restart_count: gauge(
                registry,
                "docker_container_restart_count",
                "Number of times the container has been restarted",
                CONTAINER,
            )?,
            rootfs_size,
            rw_size,
        })
    }

    pub fn observe(&self, id: &str, inspect: &ContainerInspect) {
        let labels = [id];
        self.started
            .with_label_values(&labels)
            .set(inspect.started_at as f64);
        self.finished
            .with_label_values(&labels)
            .set(inspect.finished_at as f64);
        self.exit_code
            .with_label_values(&labels)
            .set(inspect.exit_code as f64);
        self.restart_count
            .with_label_values(&labels)
            .set(inspect.restart_count as f64);

        let size = inspect.size.unwrap_or_default();
        if let Some(gauge) = &self.rootfs_size {
            gauge.with_label_values(&labels).set(size.root_fs as f64);
        }
        if let Some(gauge) = &self.rw_size {
            gauge.with_label_values(&labels).set(size.rw as f64);
        }
    }
}

/// Series derived from a stats sample, grouped by collector toggle.
#[derive(Debug, Clone)]
pub struct StatsMetrics {
    general: Option<GeneralStats>,
    cpu: Option<CpuStats>,
    net: Option<NetStats>,
}

#[derive(Debug, Clone)]
struct GeneralStats {
    pids: GaugeVec,
    mem_limit: GaugeVec,
    mem_usage: GaugeVec,
    block_input: CounterVec,
    block_output: CounterVec,
}

#[derive(Debug, Clone)]
struct CpuStats {
    user: CounterVec,
    kernel: CounterVec,
}

#[derive(Debug, Clone)]
struct NetStats {
    send_bytes: CounterVec,
    send_dropped: CounterVec,
    send_errors: CounterVec,
    recv_bytes: CounterVec,
    recv_dropped: CounterVec,
    recv_errors: CounterVec,
}

impl StatsMetrics {
    pub fn register(
        registry: &Registry,
        general: bool,
        cpu: bool,
        net: bool,
    ) -> prometheus::Result<Self> {
        let general = if general {
            Some(GeneralStats {
                pids: gauge(
                    registry,
                    "docker_container_pids",
                    "Number of processes running in the container",
                    CONTAINER,
                )?,
                mem_limit: gauge(
                    registry,
                    "docker_container_mem_limit_kib",
                    "Memory limit of the container in KiB",
                    CONTAINER,
                )?,
                mem_usage: gauge(
                    registry,
                    "docker_container_mem_usage_kib",
                    "Memory usage of the container in KiB, without page cache",
                    CONTAINER,
                )?,
                block_input: counter(
                    registry,
                    "docker_container_block_input_total",
                    "Bytes read from block devices",
                    CONTAINER,
                )?,
                block_output: counter(
                    registry,
                    "docker_container_block_output_total",
                    "Bytes written to block devices",
                    CONTAINER,
                )?,
            })
        } else {
            None
        };

        let cpu = if cpu {
            Some(CpuStats {
                user: counter(
                    registry,
                    "docker_container_cpu_user_microseconds_total",
                    "CPU time spent in user mode in microseconds",
                    CONTAINER,
                )?,
                kernel: counter(
                    registry,
                    "docker_container_cpu_kernel_microseconds_total",
                    "CPU time spent in kernel mode in microseconds",
                    CONTAINER,
                )?,
            })
        } else {
            None
        };

        let net = if net {
            Some(NetStats {
                send_bytes: counter(
                    registry,
                    "docker_container_net_send_bytes_total",
                    "Bytes sent over all network interfaces",
                    CONTAINER,
                )?,
                send_dropped: counter(
                    registry,
                    "docker_container_net_send_dropped_total",
                    "Outgoing packets dropped",
                    CONTAINER,
                )?,
                send_errors: counter(
                    registry,
                    "docker_container_net_send_errors_total",
                    "Outgoing packet errors",
                    CONTAINER,
                )?,
                recv_bytes: counter(
                    registry,
                    "docker_container_net_receive_bytes_total",
                    "Bytes received over all network interfaces",
                    CONTAINER,
                )?,
                recv_dropped: counter(
                    registry,
                    "docker_container_net_receive_dropped_total",
                    "Incoming packets dropped",
                    CONTAINER,
                )?,
                recv_errors: counter(
                    registry,
                    "docker_container_net_receive_errors_total",
                    "Incoming packet errors",
                    CONTAINER,
                )?,
            })
        } else {
            None
        };

        Ok(Self { general, cpu, net })
    }

    pub fn observe(&self, id: &str, stats: &ContainerStats) {
        let labels = [id];
        // Counters start at zero in a fresh registry, so inc_by sets the absolute value.
        let set = |counter: &CounterVec, value: u64| {
            counter.with_label_values(&labels).inc_by(value as f64);
        };

        if let Some(general) = &self.general {
            general.pids.with_label_values(&labels).set(stats.pids as f64);
            general
                .mem_limit
                .with_label_values(&labels)
                .set(stats.memory_limit_kib as f64);
            general
                .mem_usage
                .with_label_values(&labels)
                .set(stats.memory_usage_kib as f64);
            set(&general.block_input, stats.block_input_bytes);
            set(&general.block_output, stats.block_output_bytes);
        }
        if let Some(cpu) = &self.cpu {
            set(&cpu.user, stats.cpu_user_usec);
            set(&cpu.kernel, stats.cpu_kernel_usec);
        }
        if let Some(net) = &self.net {
            set(&net.send_bytes, stats.net_send_bytes);
            set(&net.send_dropped, stats.net_send_dropped);
            set(&net.send_errors, stats.net_send_errors);
            set(&net.recv_bytes, stats.net_recv_bytes);
            set(&net.recv_dropped, stats.net_recv_dropped);
            set(&net.recv_errors, stats.net_recv_errors);
        }
    }
}
