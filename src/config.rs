//! Command line and environment configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::collector::ConcurrencyLimit;
use crate::docker::{CacheSettings, DEFAULT_HOST};
use crate::exporter::Collectors;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid web address `{address}`: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Prometheus exporter for the docker daemon.
#[derive(Debug, Clone, Parser)]
#[command(name = "docker-exporter", version)]
pub struct Config {
    /// Docker daemon socket, only `unix://` hosts are supported.
    #[arg(short = 'd', long = "docker-host", env = "DOCKER_HOST", default_value = DEFAULT_HOST)]
    pub docker_host: String,

    /// Address to listen on.
    #[arg(short = 'a', long = "web.address", env = "WEB_ADDRESS", default_value = "0.0.0.0")]
    pub web_address: String,

    /// Port to listen on.
    #[arg(short = 'p', long = "web.port", env = "WEB_PORT", default_value_t = 9100)]
    pub web_port: u16,

    /// Seconds container sizes are cached for.
    #[arg(long = "cache.size-cache-seconds", env = "SIZE_CACHE_SECONDS", default_value_t = 300)]
    pub size_cache_seconds: u64,

    /// Seconds disk usage is cached for.
    #[arg(
        long = "cache.disk-usage-cache-seconds",
        env = "DISK_USAGE_CACHE_SECONDS",
        default_value_t = 120
    )]
    pub disk_usage_cache_seconds: u64,

    /// Containers collected at once during warm-up, 0 for unbounded.
    #[arg(long = "warmup.concurrency", env = "WARMUP_CONCURRENCY", default_value_t = 5)]
    pub warmup_concurrency: usize,

    /// Containers collected at once per scrape, 0 for unbounded.
    #[arg(long = "scrape.concurrency", env = "SCRAPE_CONCURRENCY", default_value_t = 16)]
    pub scrape_concurrency: usize,

    /// Export host information and docker disk usage.
    #[arg(long = "collector.system", default_value_t = true, action = ArgAction::Set)]
    pub collector_system: bool,

    /// Export per-container metrics.
    #[arg(long = "collector.container", default_value_t = true, action = ArgAction::Set)]
    pub collector_container: bool,

    /// Export container network counters.
    #[arg(long = "collector.container.net", default_value_t = true, action = ArgAction::Set)]
    pub collector_container_net: bool,

    /// Export container CPU counters.
    #[arg(long = "collector.container.cpu", default_value_t = true, action = ArgAction::Set)]
    pub collector_container_cpu: bool,

    /// Export container filesystem sizes.
    #[arg(long = "collector.container.fs", default_value_t = true, action = ArgAction::Set)]
    pub collector_container_fs: bool,

    /// Export container pids, memory and block I/O.
    #[arg(long = "collector.container.stats", default_value_t = true, action = ArgAction::Set)]
    pub collector_container_stats: bool,

    /// Address of the host reported on `/api/info`.
    #[arg(long = "host-ip", env = "IP")]
    pub host_ip: Option<String>,

    /// Host root filesystem, used to read `etc/hostname`, `etc/os-release` and `proc`.
    #[arg(long = "rootfs", env = "ROOTFS_MOUNT_PATH", default_value = "/")]
    pub rootfs: PathBuf,

    /// Log debug messages.
    #[arg(short = 'v', long = "log.verbose")]
    pub verbose: bool,

    /// Log trace messages.
    #[arg(long = "log.trace")]
    pub trace: bool,

    /// Only log warnings and errors.
    #[arg(short = 'q', long = "log.quiet", conflicts_with_all = ["verbose", "trace"])]
    pub quiet: bool,
}

impl Config {
    /// Socket address of the HTTP listener.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the web address is not an IP address.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .web_address
            .parse()
            .map_err(|source| Error::InvalidAddress {
                address: self.web_address.clone(),
                source,
            })?;
        Ok(SocketAddr::new(ip, self.web_port))
    }

    /// Default log filter, used when `RUST_LOG` is not set.
    pub fn log_level(&self) -> log::LevelFilter {
        if self.trace {
            log::LevelFilter::Trace
        } else if self.verbose {
            log::LevelFilter::Debug
        } else if self.quiet {
            log::LevelFilter::Warn
        } else {
            log::LevelFilter::Info
        }
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            container_sizes_ttl: Duration::from_secs(self.size_cache_seconds),
            disk_usage_ttl: Duration::from_secs(self.disk_usage_cache_seconds),
        }
    }

    pub fn collectors(&self) -> Collectors {
        Collectors {
            system: self.collector_system,
            container: self.collector_container,
            container_net: self.collector_container_net,
            container_cpu: self.collector_container_cpu,
            container_fs: self.collector_container_fs,
            container_stats: self.collector_container_stats,
        }
    }

    pub fn warmup_limit(&self) -> ConcurrencyLimit {
        ConcurrencyLimit::from_config(self.warmup_concurrency)
    }

    pub fn scrape_limit(&self) -> ConcurrencyLimit {
        ConcurrencyLimit::from_config(self.scrape_concurrency)
    }
}
