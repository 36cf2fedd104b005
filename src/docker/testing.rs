//! In-memory [`Daemon`] for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::container::ContainerID;

use super::models::{
    ContainerInfo, ContainerInspect, ContainerSize, ContainerState, ContainerStats, CpuUsage,
    DiskUsage,
};
use super::{Daemon, Error, Result};

pub const IMAGES_TOTAL_SIZE: i64 = 4096;

/// Builds a running container summary.
pub fn container(id: &str) -> ContainerInfo {
    ContainerInfo {
        id: ContainerID::new(id).unwrap(),
        names: vec![format!("{id}-name")],
        image_id: "sha256:feed".to_owned(),
        command: "sleep infinity".to_owned(),
        ports: Vec::new(),
        network_mode: "bridge".to_owned(),
        created: 1_700_000_000,
        state: ContainerState::Running,
        size: None,
    }
}

/// Sample returned by the fake for every container.
pub fn stats() -> ContainerStats {
    ContainerStats {
        pids: 3,
        cpu_user_usec: 1500,
        cpu_kernel_usec: 500,
        cpu: CpuUsage {
            total_ns: 300,
            pre_total_ns: 100,
            system_ns: 2000,
            pre_system_ns: 1000,
            online_cpus: 2,
        },
        memory_usage_kib: 2048,
        memory_limit_kib: 4096,
        net_send_bytes: 10,
        net_recv_bytes: 20,
        ..Default::default()
    }
}

#[derive(Debug, Default)]
struct Counters {
    list_calls: AtomicUsize,
    list_size_calls: AtomicUsize,
    inspect_calls: AtomicUsize,
    inspect_size_calls: AtomicUsize,
    stats_calls: AtomicUsize,
    disk_usage_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a Counters);

impl<'a> InFlight<'a> {
    fn enter(counters: &'a Counters) -> Self {
        let running = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.max_in_flight.fetch_max(running, Ordering::SeqCst);
        Self(counters)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Scriptable daemon with failure injection, artificial latency and call counters.
#[derive(Debug, Default)]
pub struct FakeDaemon {
    containers: Mutex<Vec<ContainerInfo>>,
    sizes: HashMap<String, ContainerSize>,
    failing_inspect: HashSet<String>,
    failing_stats: HashSet<String>,
    fail_list: AtomicBool,
    fail_disk_usage: AtomicBool,
    fail_ping: AtomicBool,
    delay: Duration,
    counters: Counters,
}

impl FakeDaemon {
    pub fn with_containers(ids: &[&str]) -> Self {
        Self {
            containers: Mutex::new(ids.iter().map(|id| container(id)).collect()),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, id: &str, root_fs: i64, rw: i64) -> Self {
        self.sizes.insert(id.to_owned(), ContainerSize { root_fs, rw });
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail_inspect(mut self, id: &str) -> Self {
        self.failing_inspect.insert(id.to_owned());
        self
    }

    pub fn fail_stats(mut self, id: &str) -> Self {
        self.failing_stats.insert(id.to_owned());
        self
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_disk_usage(&self, fail: bool) {
        self.fail_disk_usage.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_ping(&self, fail: bool) {
        self.fail_ping.store(fail, Ordering::SeqCst);
    }

    pub fn set_containers(&self, containers: Vec<ContainerInfo>) {
        *self.containers.lock().unwrap() = containers;
    }

    pub fn list_calls(&self) -> usize {
        self.counters.list_calls.load(Ordering::SeqCst)
    }

    pub fn list_size_calls(&self) -> usize {
        self.counters.list_size_calls.load(Ordering::SeqCst)
    }

    pub fn inspect_calls(&self) -> usize {
        self.counters.inspect_calls.load(Ordering::SeqCst)
    }

    pub fn inspect_size_calls(&self) -> usize {
        self.counters.inspect_size_calls.load(Ordering::SeqCst)
    }

    pub fn stats_calls(&self) -> usize {
        self.counters.stats_calls.load(Ordering::SeqCst)
    }

    pub fn disk_usage_calls(&self) -> usize {
        self.counters.disk_usage_calls.load(Ordering::SeqCst)
    }

    /// Highest number of inspect and stats calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.counters.max_in_flight.load(Ordering::SeqCst)
    }

    async fn pause(&self, token: &CancellationToken, path: &str) -> Result<()> {
        if self.delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = tokio::time::sleep(self.delay) => Ok(()),
            () = token.cancelled() => Err(Error::Cancelled(path.to_owned())),
        }
    }
}

fn daemon_error(path: &str, message: &str) -> Error {
    Error::Status {
        path: path.to_owned(),
        status: hyper::StatusCode::INTERNAL_SERVER_ERROR,
        message: message.to_owned(),
    }
}

impl Daemon for FakeDaemon {
    async fn list_containers(
        &self,
        token: &CancellationToken,
        size: bool,
    ) -> Result<Vec<ContainerInfo>> {
        self.counters.list_calls.fetch_add(1, Ordering::SeqCst);
        if size {
            self.counters.list_size_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.pause(token, "/containers/json").await?;
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(daemon_error("/containers/json", "listing failed"));
        }

        let mut containers = self.containers.lock().unwrap().clone();
        if size {
            for container in &mut containers {
                container.size = self.sizes.get(container.id.as_str()).copied();
            }
        }
        Ok(containers)
    }

    async fn inspect_container(
        &self,
        token: &CancellationToken,
        id: &ContainerID,
        size: bool,
    ) -> Result<ContainerInspect> {
        let _in_flight = InFlight::enter(&self.counters);
        self.counters.inspect_calls.fetch_add(1, Ordering::SeqCst);
        if size {
            self.counters.inspect_size_calls.fetch_add(1, Ordering::SeqCst);
        }
        let path = format!("/containers/{id}/json");
        self.pause(token, &path).await?;
        if self.failing_inspect.contains(id.as_str()) {
            return Err(daemon_error(&path, "inspect failed"));
        }

        Ok(ContainerInspect {
            exit_code: 0,
            started_at: 1_700_000_100,
            finished_at: 0,
            restart_count: 1,
            nano_cpus: 0,
            size: size.then(|| self.sizes.get(id.as_str()).copied().unwrap_or_default()),
        })
    }

    async fn container_stats(
        &self,
        token: &CancellationToken,
        id: &ContainerID,
    ) -> Result<ContainerStats> {
        let _in_flight = InFlight::enter(&self.counters);
        self.counters.stats_calls.fetch_add(1, Ordering::SeqCst);
        let path = format!("/containers/{id}/stats");
        self.pause(token, &path).await?;
        if self.failing_stats.contains(id.as_str()) {
            return Err(daemon_error(&path, "stats failed"));
        }
        Ok(stats())
    }

    async fn disk_usage(&self, token: &CancellationToken) -> Result<DiskUsage> {
        self.counters.disk_usage_calls.fetch_add(1, Ordering::SeqCst);
        self.pause(token, "/system/df").await?;
        if self.fail_disk_usage.load(Ordering::SeqCst) {
            return Err(daemon_error("/system/df", "disk usage failed"));
        }
        Ok(DiskUsage {
            images_total_size: IMAGES_TOTAL_SIZE,
            images_reclaimable: 1024,
            ..Default::default()
        })
    }

    async fn ping(&self, token: &CancellationToken) -> Result<String> {
        self.pause(token, "/_ping").await?;
        if self.fail_ping.load(Ordering::SeqCst) {
            return Err(daemon_error("/_ping", "daemon unavailable"));
        }
        Ok("1.45".to_owned())
    }
}
