use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::collector::{self, CollectOptions, ConcurrencyLimit};
use crate::docker::{Daemon, Docker};
use crate::status::Status;

/// Populates the daemon caches, then opens the readiness gate.
///
/// Loads the disk usage cache, lists all containers and collects them with
/// `limit`, discarding the samples. Failures are logged only; the gate is
/// opened once the pass is over, whether it succeeded or not.
pub async fn warm_up<D>(
    docker: &Docker<D>,
    status: &Status,
    limit: ConcurrencyLimit,
    options: CollectOptions,
) where
    D: Daemon,
{
    let started = Instant::now();
    log::info!("Collecting initial metrics (concurrency {limit})...");

    let token = CancellationToken::new();
    docker.disk_usage(&token).await;

    match docker.list_containers(&token).await {
        Ok(containers) => {
            let collected = collector::collect(docker, &containers, limit, options).await;
            log::debug!(
                "Warm-up collected {} of {} containers",
                collected.len(),
                containers.len()
            );
        }
        Err(err) => log::warn!("failed to list containers during warm-up: {err}"),
    }

    status.set_ready();
    log::info!(
        "Initial metrics collected in {}ms, ready to serve",
        started.elapsed().as_millis()
    );
}
