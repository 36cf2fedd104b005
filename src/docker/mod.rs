//! Access to the docker daemon.
//!
//! [`Daemon`] is the raw Engine API surface, implemented over the unix socket
//! by [`DockerClient`]. [`Docker`] wraps a daemon with the two expensive-query
//! caches and records every call outcome in the [`ErrorRegistry`].

mod client;
mod error;
pub mod models;
#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cache::{LoadError, RefreshCache};
use crate::container::ContainerID;
use crate::status::ErrorRegistry;

pub use client::{DEFAULT_HOST, DockerClient, socket_path};
pub use error::{Error, Result};
pub use models::{
    ContainerInfo, ContainerInspect, ContainerSize, ContainerSizes, ContainerState,
    ContainerStats, CpuUsage, DiskUsage, Port,
};

pub const OP_LIST_CONTAINERS: &str = "list_containers";
pub const OP_INSPECT_CONTAINER: &str = "inspect_container";
pub const OP_CONTAINER_STATS: &str = "container_stats";
pub const OP_CONTAINER_SIZES: &str = "container_sizes";
pub const OP_DISK_USAGE: &str = "disk_usage";

/// Engine API operations used by the exporter.
///
/// Every call takes the caller's cancellation token; a cancelled call returns
/// [`Error::Cancelled`].
pub trait Daemon: Send + Sync + 'static {
    /// Lists all containers, including stopped ones.
    ///
    /// # Arguments
    ///
    /// * `size` - Ask the daemon to compute per-container disk usage. Expensive.
    fn list_containers(
        &self,
        token: &CancellationToken,
        size: bool,
    ) -> impl Future<Output = Result<Vec<ContainerInfo>>> + Send;

    fn inspect_container(
        &self,
        token: &CancellationToken,
        id: &ContainerID,
        size: bool,
    ) -> impl Future<Output = Result<ContainerInspect>> + Send;

    /// Takes a single, non-streaming stats sample.
    fn container_stats(
        &self,
        token: &CancellationToken,
        id: &ContainerID,
    ) -> impl Future<Output = Result<ContainerStats>> + Send;

    fn disk_usage(
        &self,
        token: &CancellationToken,
    ) -> impl Future<Output = Result<DiskUsage>> + Send;

    /// Returns the daemon's API version.
    fn ping(&self, token: &CancellationToken) -> impl Future<Output = Result<String>> + Send;
}

/// Refresh intervals of the daemon caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub container_sizes_ttl: Duration,
    pub disk_usage_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            container_sizes_ttl: Duration::from_secs(300),
            disk_usage_ttl: Duration::from_secs(120),
        }
    }
}

/// Cached, error-tracking facade over a [`Daemon`].
///
/// Cloning returns another handle to the same daemon and caches.
pub struct Docker<D> {
    daemon: Arc<D>,
    sizes: RefreshCache<ContainerSizes>,
    disk: RefreshCache<DiskUsage>,
    errors: ErrorRegistry,
}

impl<D> Clone for Docker<D> {
    fn clone(&self) -> Self {
        Self {
            daemon: Arc::clone(&self.daemon),
            sizes: self.sizes.clone(),
            disk: self.disk.clone(),
            errors: self.errors.clone(),
        }
    }
}

impl<D> std::fmt::Debug for Docker<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Docker")
            .field("sizes", &self.sizes)
            .field("disk", &self.disk)
            .finish_non_exhaustive()
    }
}

impl<D> Docker<D>
where
    D: Daemon,
{
    pub fn new(daemon: D, errors: ErrorRegistry, settings: CacheSettings) -> Self {
        let daemon = Arc::new(daemon);

        let sizes = {
            let daemon = Arc::clone(&daemon);
            let errors = errors.clone();
            RefreshCache::new(
                OP_CONTAINER_SIZES,
                settings.container_sizes_ttl,
                move |lifetime| {
                    let daemon = Arc::clone(&daemon);
                    let errors = errors.clone();
                    async move {
                        let result = load_container_sizes(daemon.as_ref(), &lifetime).await;
                        errors.record(OP_CONTAINER_SIZES, &result);
                        result.map_err(LoadError::from)
                    }
                },
            )
        };

        let disk = {
            let daemon = Arc::clone(&daemon);
            let errors = errors.clone();
            RefreshCache::new(OP_DISK_USAGE, settings.disk_usage_ttl, move |lifetime| {
                let daemon = Arc::clone(&daemon);
                let errors = errors.clone();
                async move {
                    let result = daemon.disk_usage(&lifetime).await;
                    errors.record(OP_DISK_USAGE, &result);
                    result.map_err(LoadError::from)
                }
            })
        };

        Self {
            daemon,
            sizes,
            disk,
            errors,
        }
    }

    pub fn daemon(&self) -> &D {
        &self.daemon
    }

    pub fn errors(&self) -> &ErrorRegistry {
        &self.errors
    }

    /// Lists all containers without size data.
    pub async fn list_containers(&self, token: &CancellationToken) -> Result<Vec<ContainerInfo>> {
        let result = self.daemon.list_containers(token, false).await;
        self.errors.record(OP_LIST_CONTAINERS, &result);
        result
    }

    /// Inspects a container.
    ///
    /// With `want_size`, sizes come from the size cache. The daemon is only
    /// asked to compute them for containers the cache does not know yet.
    pub async fn inspect_container(
        &self,
        token: &CancellationToken,
        id: &ContainerID,
        want_size: bool,
    ) -> Result<ContainerInspect> {
        let cached = if want_size {
            self.sizes
                .get_values(token)
                .await
                .get(id)
                .copied()
                .filter(|size| size.root_fs != 0)
        } else {
            None
        };

        let result = self
            .daemon
            .inspect_container(token, id, want_size && cached.is_none())
            .await;
        self.errors.record(OP_INSPECT_CONTAINER, &result);

        let mut inspect = result?;
        if cached.is_some() {
            inspect.size = cached;
        }
        Ok(inspect)
    }

    pub async fn container_stats(
        &self,
        token: &CancellationToken,
        id: &ContainerID,
    ) -> Result<ContainerStats> {
        let result = self.daemon.container_stats(token, id).await;
        self.errors.record(OP_CONTAINER_STATS, &result);
        result
    }

    /// Returns the cached disk usage, zeroed if it could not be loaded yet.
    pub async fn disk_usage(&self, token: &CancellationToken) -> DiskUsage {
        self.disk.get_values(token).await
    }

    pub async fn container_sizes(&self, token: &CancellationToken) -> ContainerSizes {
        self.sizes.get_values(token).await
    }

    pub async fn ping(&self, token: &CancellationToken) -> Result<String> {
        self.daemon.ping(token).await
    }

    /// Cancels in-flight cache refreshes.
    pub fn close(&self) {
        self.sizes.close();
        self.disk.close();
    }
}

/// Loads the size of every container with a single size-inclusive listing.
async fn load_container_sizes<D>(daemon: &D, token: &CancellationToken) -> Result<ContainerSizes>
where
    D: Daemon,
{
    let containers = daemon.list_containers(token, true).await?;
    Ok(containers
        .into_iter()
        .filter_map(|container| container.size.map(|size| (container.id, size)))
        .collect())
}
