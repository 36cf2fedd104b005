//! Per-container fan-out of inspect and stats calls.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::container::ContainerID;
use crate::docker::{ContainerInfo, ContainerInspect, ContainerStats, Daemon, Docker};

/// Upper bound on concurrently collected containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcurrencyLimit {
    Bounded(NonZeroUsize),
    Unbounded,
}

impl ConcurrencyLimit {
    /// Maps a configured limit to a [`ConcurrencyLimit`], `0` meaning unbounded.
    pub fn from_config(limit: usize) -> Self {
        NonZeroUsize::new(limit).map_or(Self::Unbounded, Self::Bounded)
    }

    fn semaphore(self) -> Option<Arc<Semaphore>> {
        match self {
            Self::Bounded(limit) => Some(Arc::new(Semaphore::new(limit.get()))),
            Self::Unbounded => None,
        }
    }
}

impl std::fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bounded(limit) => write!(f, "{limit}"),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Which per-container data a collection cycle needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectOptions {
    /// Request root filesystem and writable layer sizes with inspect.
    pub want_size: bool,
    /// Take a stats sample after a successful inspect.
    pub want_stats: bool,
}

/// Everything collected for one container in a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSample {
    pub inspect: ContainerInspect,
    /// `None` only when stats were not requested.
    pub stats: Option<ContainerStats>,
}

/// Samples of all containers collected successfully, keyed by id.
pub type CollectionResult = HashMap<ContainerID, ContainerSample>;

/// Best-effort view of one container for the JSON API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerOverview {
    /// `None` if the inspect call failed.
    pub inspect: Option<ContainerInspect>,
    /// `None` for containers that are not running or whose stats call failed.
    pub stats: Option<ContainerStats>,
}

/// Overviews of every listed container, keyed by id.
pub type OverviewResult = HashMap<ContainerID, ContainerOverview>;

/// Inspects, and optionally samples stats of, every container concurrently.
///
/// A container whose inspect or stats call fails is logged and left out of the
/// result; failures never abort the rest of the cycle. Per-container calls run
/// as detached tasks, so they complete even if the returned future is dropped.
///
/// # Arguments
///
/// * `docker` - Daemon facade used for every call.
/// * `containers` - Containers of the current listing.
/// * `limit` - Maximum number of containers collected at the same time.
/// * `options` - Data to collect per container.
pub async fn collect<D>(
    docker: &Docker<D>,
    containers: &[ContainerInfo],
    limit: ConcurrencyLimit,
    options: CollectOptions,
) -> CollectionResult
where
    D: Daemon,
{
    let result = fan_out(docker, containers, limit, move |docker, token, container| async move {
        sample(&docker, &token, container.id, options).await
    })
    .await;
    log::debug!(
        "Collected {} of {} containers (concurrency {})",
        result.len(),
        containers.len(),
        limit
    );
    result
}

/// Inspects every container and samples stats of the running ones.
///
/// Unlike [`collect`], a failed call only blanks its own part of the overview:
/// every listed container is present in the result.
pub async fn collect_overview<D>(
    docker: &Docker<D>,
    containers: &[ContainerInfo],
    limit: ConcurrencyLimit,
) -> OverviewResult
where
    D: Daemon,
{
    fan_out(docker, containers, limit, |docker, token, container| async move {
        Some(overview(&docker, &token, &container).await)
    })
    .await
}

/// Spawns `per_container` for every container and gathers the `Some` outputs.
///
/// Tasks are spawned with [`tokio::spawn`]; dropping a [`JoinHandle`] detaches
/// its task instead of aborting it.
async fn fan_out<D, T, F, Fut>(
    docker: &Docker<D>,
    containers: &[ContainerInfo],
    limit: ConcurrencyLimit,
    per_container: F,
) -> HashMap<ContainerID, T>
where
    D: Daemon,
    T: Send + 'static,
    F: Fn(Docker<D>, CancellationToken, ContainerInfo) -> Fut,
    Fut: Future<Output = Option<T>> + Send + 'static,
{
    let semaphore = limit.semaphore();
    // Per-container calls are never cancelled once started.
    let token = CancellationToken::new();

    let handles: Vec<(ContainerID, JoinHandle<Option<T>>)> = containers
        .iter()
        .map(|container| {
            let work = per_container(docker.clone(), token.clone(), container.clone());
            let semaphore = semaphore.clone();
            let handle = tokio::spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => Some(semaphore.acquire_owned().await.ok()?),
                    None => None,
                };
                work.await
            });
            (container.id.clone(), handle)
        })
        .collect();

    let mut result = HashMap::with_capacity(handles.len());
    for (id, handle) in handles {
        match handle.await {
            Ok(Some(value)) => {
                result.insert(id, value);
            }
            Ok(None) => {}
            Err(err) => {
                log::error!("container collection task failed: container_id={id}, error={err}")
            }
        }
    }
    result
}

async fn sample<D>(
    docker: &Docker<D>,
    token: &CancellationToken,
    id: ContainerID,
    options: CollectOptions,
) -> Option<ContainerSample>
where
    D: Daemon,
{
    let inspect = match docker.inspect_container(token, &id, options.want_size).await {
        Ok(inspect) => inspect,
        Err(err) => {
            log::warn!("failed to inspect container: container_id={id}, error={err}");
            return None;
        }
    };

    let stats = if options.want_stats {
        match docker.container_stats(token, &id).await {
            Ok(stats) => Some(stats),
            Err(err) => {
                log::warn!("failed to get container stats: container_id={id}, error={err}");
                return None;
            }
        }
    } else {
        None
    };

    Some(ContainerSample { inspect, stats })
}

async fn overview<D>(
    docker: &Docker<D>,
    token: &CancellationToken,
    container: &ContainerInfo,
) -> ContainerOverview
where
    D: Daemon,
{
    let id = &container.id;
    let inspect = docker
        .inspect_container(token, id, false)
        .await
        .map_err(|err| log::debug!("failed to inspect container: container_id={id}, error={err}"))
        .ok();

    // stopped containers have no stats worth sampling
    let stats = if container.state.is_running() {
        docker
            .container_stats(token, id)
            .await
            .map_err(|err| {
                log::debug!("failed to get container stats: container_id={id}, error={err}")
            })
            .ok()
    } else {
        None
    };

    ContainerOverview { inspect, stats }
}
