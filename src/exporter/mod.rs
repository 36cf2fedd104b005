//! Prometheus rendering of daemon state.
//!
//! Every scrape builds a fresh [`prometheus::Registry`], so containers that
//! vanished or failed in this cycle produce no series at all.

mod error;
mod metrics;

use prometheus::{GaugeVec, Opts, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;

use crate::collector::{self, CollectOptions, CollectionResult, ConcurrencyLimit, OverviewResult};
use crate::docker::{ContainerInfo, Daemon, Docker};
use crate::osinfo::OsInfo;

pub use error::{Error, Result};
use metrics::{InspectMetrics, ListingMetrics, StatsMetrics, SystemMetrics};

/// Enabled metric groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Collectors {
    /// Host information and disk usage.
    pub system: bool,
    /// Per-container listing and inspect series. Disables all other container groups when off.
    pub container: bool,
    pub container_net: bool,
    pub container_cpu: bool,
    /// Root filesystem and writable layer sizes.
    pub container_fs: bool,
    /// Pids, memory and block I/O.
    pub container_stats: bool,
}

impl Default for Collectors {
    fn default() -> Self {
        Self {
            system: true,
            container: true,
            container_net: true,
            container_cpu: true,
            container_fs: true,
            container_stats: true,
        }
    }
}

impl Collectors {
    /// Per-container data the enabled groups need.
    pub fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            want_size: self.container && self.container_fs,
            want_stats: self.container
                && (self.container_net || self.container_cpu || self.container_stats),
        }
    }
}

/// Static facts about the exporter and its host.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HostInfo {
    pub hostname: String,
    pub version: String,
    /// Address the host is reachable at, if configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    pub os: OsInfo,
}

/// Renders scrapes of one daemon.
#[derive(Debug)]
pub struct Exporter<D> {
    docker: Docker<D>,
    host: HostInfo,
    collectors: Collectors,
    limit: ConcurrencyLimit,
}

impl<D> Exporter<D>
where
    D: Daemon,
{
    pub fn new(
        docker: Docker<D>,
        host: HostInfo,
        collectors: Collectors,
        limit: ConcurrencyLimit,
    ) -> Self {
        Self {
            docker,
            host,
            collectors,
            limit,
        }
    }

    pub fn docker(&self) -> &Docker<D> {
        &self.docker
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    /// Lists all containers and collects them with the scrape concurrency limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Docker`] if the listing fails.
    pub async fn collect_containers(
        &self,
        token: &CancellationToken,
        options: CollectOptions,
    ) -> Result<(Vec<ContainerInfo>, CollectionResult)> {
        let containers = self.docker.list_containers(token).await?;
        let samples = collector::collect(&self.docker, &containers, self.limit, options).await;
        Ok((containers, samples))
    }

    /// Lists all containers and collects a best-effort overview of each.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Docker`] if the listing fails.
    pub async fn overview(
        &self,
        token: &CancellationToken,
    ) -> Result<(Vec<ContainerInfo>, OverviewResult)> {
        let containers = self.docker.list_containers(token).await?;
        let overviews = collector::collect_overview(&self.docker, &containers, self.limit).await;
        Ok((containers, overviews))
    }

    /// Collects all enabled metric groups and encodes them in the text exposition format.
    ///
    /// A failed container listing is logged and leaves out every per-container
    /// series; host series are still rendered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Prometheus`] if a metric cannot be registered or encoded.
    pub async fn scrape(&self, token: &CancellationToken) -> Result<String> {
        let registry = Registry::new();

        let info = GaugeVec::new(
            Opts::new("docker_exporter_info", "Information about the docker exporter"),
            &["hostname", "version"],
        )?;
        registry.register(Box::new(info.clone()))?;
        info.with_label_values(&[self.host.hostname.as_str(), self.host.version.as_str()])
            .set(1.0);

        if self.collectors.system {
            let system = SystemMetrics::register(&registry)?;
            system.observe_host(&self.host.hostname, &self.host.os);
            let usage = self.docker.disk_usage(token).await;
            system.observe_disk_usage(&self.host.hostname, &usage);
        }

        if self.collectors.container {
            self.scrape_containers(&registry, token).await?;
        }

        let encoded = TextEncoder::new().encode_to_string(&registry.gather())?;
        Ok(encoded)
    }

    async fn scrape_containers(&self, registry: &Registry, token: &CancellationToken) -> Result<()> {
        let collectors = &self.collectors;
        let options = collectors.collect_options();
        let listing = ListingMetrics::register(registry)?;
        let inspect = InspectMetrics::register(registry, options.want_size)?;
        let stats = StatsMetrics::register(
            registry,
            collectors.container_stats,
            collectors.container_cpu,
            collectors.container_net,
        )?;

        let (containers, samples) = match self.collect_containers(token, options).await {
            Ok(collected) => collected,
            Err(err) => {
                log::warn!("failed to list containers: {err}");
                return Ok(());
            }
        };

        for container in &containers {
            listing.observe(container);
            let Some(sample) = samples.get(&container.id) else {
                continue;
            };
            let id = container.id.as_str();
            inspect.observe(id, &sample.inspect);
            if let Some(sample_stats) = &sample.stats {
                stats.observe(id, sample_stats);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::testing::FakeDaemon;
    use crate::docker::{CacheSettings, testing};
    use crate::status::ErrorRegistry;

    fn host() -> HostInfo {
        HostInfo {
            hostname: "host-1".to_owned(),
            version: "1.2.3".to_owned(),
            host_ip: None,
            os: OsInfo {
                name: "Debian GNU".to_owned(),
                version_id: "12".to_owned(),
            },
        }
    }

    fn exporter(daemon: FakeDaemon, collectors: Collectors) -> Exporter<FakeDaemon> {
        let docker = Docker::new(daemon, ErrorRegistry::new(), CacheSettings::default());
        Exporter::new(docker, host(), collectors, ConcurrencyLimit::from_config(4))
    }

    fn has_line(text: &str, line: &str) -> bool {
        text.lines().any(|l| l == line)
    }

    #[tokio::test]
    async fn test_scrape_renders_all_groups() {
        let daemon = FakeDaemon::with_containers(&["a", "b"])
            .with_size("a", 300, 30)
            .fail_inspect("b");
        let exporter = exporter(daemon, Collectors::default());

        let text = exporter.scrape(&CancellationToken::new()).await.unwrap();

        assert!(has_line(
            &text,
            r#"docker_exporter_info{hostname="host-1",version="1.2.3"} 1"#
        ));
        assert!(has_line(
            &text,
            r#"docker_host_os_info{hostname="host-1",os_name="Debian GNU",os_version="12"} 1"#
        ));
        assert!(has_line(
            &text,
            &format!(
                r#"docker_disk_usage_images_total_bytes{{hostname="host-1"}} {}"#,
                testing::IMAGES_TOTAL_SIZE
            )
        ));
        // listing series for both containers
        assert!(has_line(&text, r#"docker_container_state{container_id="a"} 1"#));
        assert!(has_line(&text, r#"docker_container_state{container_id="b"} 1"#));
        assert!(has_line(
            &text,
            r#"docker_container_name{container_id="a",name="a-name"} 1"#
        ));
        // inspect and stats only for the container that was collected
        assert!(has_line(&text, r#"docker_container_restart_count{container_id="a"} 1"#));
        assert!(!text.contains(r#"docker_container_restart_count{container_id="b"}"#));
        assert!(has_line(&text, r#"docker_container_rootfs_size_bytes{container_id="a"} 300"#));
        assert!(has_line(&text, r#"docker_container_rw_size_bytes{container_id="a"} 30"#));
        assert!(has_line(&text, r#"docker_container_pids{container_id="a"} 3"#));
        assert!(has_line(
            &text,
            r#"docker_container_cpu_user_microseconds_total{container_id="a"} 1500"#
        ));
        assert!(has_line(
            &text,
            r#"docker_container_net_receive_bytes_total{container_id="a"} 20"#
        ));
        assert!(!text.contains(r#"docker_container_pids{container_id="b"}"#));
    }

    #[tokio::test]
    async fn test_listing_failure_renders_system_only() {
        let exporter = exporter(FakeDaemon::with_containers(&["a"]), Collectors::default());
        exporter.docker().daemon().set_fail_list(true);

        let text = exporter.scrape(&CancellationToken::new()).await.unwrap();

        assert!(text.contains("docker_host_os_info"));
        assert!(text.contains("docker_disk_usage_volumes_reclaimable_bytes"));
        assert!(!text.contains("docker_container_"));
    }

    #[tokio::test]
    async fn test_disabled_groups_are_not_collected() {
        let collectors = Collectors {
            system: false,
            container_net: false,
            container_cpu: false,
            container_fs: false,
            container_stats: false,
            ..Default::default()
        };
        let exporter = exporter(FakeDaemon::with_containers(&["a"]), collectors);

        let text = exporter.scrape(&CancellationToken::new()).await.unwrap();

        assert!(has_line(&text, r#"docker_container_exit_code{container_id="a"} 0"#));
        assert!(!text.contains("docker_host_os_info"));
        assert!(!text.contains("docker_container_rootfs_size_bytes"));
        assert!(!text.contains("docker_container_pids"));
        let daemon = exporter.docker().daemon();
        assert_eq!(daemon.stats_calls(), 0);
        assert_eq!(daemon.disk_usage_calls(), 0);
        assert_eq!(daemon.list_size_calls(), 0);
    }

    #[test]
    fn test_collect_options() {
        let mut collectors = Collectors::default();
        assert_eq!(
            collectors.collect_options(),
            CollectOptions {
                want_size: true,
                want_stats: true
            }
        );

        collectors.container_stats = false;
        collectors.container_net = false;
        assert!(collectors.collect_options().want_stats);

        collectors.container_cpu = false;
        assert!(!collectors.collect_options().want_stats);

        collectors.container = false;
        assert_eq!(collectors.collect_options(), CollectOptions::default());
    }
}
