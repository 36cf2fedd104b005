//! Docker Exporter: a Prometheus exporter for the docker daemon.
//!
//! This library provides the daemon client with its refresh-coalescing caches,
//! the bounded per-container collector, the readiness gate that holds back
//! scrapes until a warm-up pass is done, and the HTTP surface serving metrics.

use std::sync::Arc;

use tokio::signal::unix::{SignalKind, signal};

use docker::{Docker, DockerClient};
use error::ResultOkLogExt;
use exporter::{Exporter, HostInfo};
use osinfo::OsInfo;
use status::Status;
use usage::UsageSampler;

pub mod api;
pub mod cache;
pub mod collector;
pub mod config;
pub mod container;
pub mod docker;
pub mod error;
pub mod exporter;
pub mod fsutil;
pub mod osinfo;
pub mod status;
pub mod usage;
pub mod warmup;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Runs the exporter until a shutdown signal arrives.
///
/// Connects the daemon client, starts the warm-up pass in the background and
/// serves HTTP. `/metrics` answers 503 until warm-up has finished.
///
/// # Errors
///
/// Possible errors include:
/// - An invalid listen address.
/// - A docker host other than `unix://`.
/// - Failure to bind or run the HTTP listener.
pub async fn run(config: config::Config) -> error::Result<()> {
    let addr = config.listen_addr()?;
    let client = DockerClient::new(&config.docker_host)?;
    log::info!("Using docker daemon at {}", client.socket().display());

    let status = Arc::new(Status::new());
    let docker = Docker::new(client, status.errors().clone(), config.cache_settings());

    let hostname = fsutil::read_hostname(&config.rootfs)
        .ok_log()
        .unwrap_or_default();
    let os = OsInfo::read(&config.rootfs);
    log::debug!(
        "Hostname: {}, OS: {} {}",
        hostname,
        os.name,
        os.version_id
    );
    let host = HostInfo {
        hostname,
        version: VERSION.to_owned(),
        host_ip: config.host_ip.clone().filter(|ip| !ip.is_empty()),
        os,
    };

    let collectors = config.collectors();
    let exporter = Arc::new(Exporter::new(
        docker.clone(),
        host,
        collectors,
        config.scrape_limit(),
    ));

    let warmup = {
        let docker = docker.clone();
        let status = Arc::clone(&status);
        let limit = config.warmup_limit();
        let options = collectors.collect_options();
        tokio::spawn(async move { warmup::warm_up(&docker, &status, limit, options).await })
    };

    let usage = UsageSampler::new(config.rootfs.clone());
    let server = api::APIServer::new(api::AppState::new(exporter, status, usage));
    let result = server.listen(addr, shutdown_signal()).await;

    warmup.abort();
    docker.close();
    log::info!("Stopped");
    Ok(result?)
}

async fn shutdown_signal() {
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                log::error!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            log::error!("failed to install SIGINT handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = terminate => {}
        () = interrupt => {}
    }
    log::info!("Shutdown signal received, draining connections...");
}
