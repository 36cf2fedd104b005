//! Refresh-coalescing cache for expensive daemon queries.
//!
//! A [`RefreshCache`] holds a single value produced by an async loader. Callers
//! never trigger more than one concurrent load per cache instance:
//!
//! - a fresh value is returned immediately,
//! - a stale value is returned immediately while a single background refresh runs,
//! - a cold cache (never loaded successfully) blocks callers until the in-flight
//!   load finishes, or until the caller's own cancellation token fires.
//!
//! Refreshes run as detached tasks driven by the cache's own lifetime token, so
//! a caller that gives up waiting never aborts work other callers depend on.
//! A failed load leaves the cached value and its timestamp untouched.

mod completion;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use completion::{Completion, Waiter};

/// Error type returned by cache loaders.
pub type LoadError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed future produced by a cache loader.
pub type LoadFuture<T> = Pin<Box<dyn Future<Output = Result<T, LoadError>> + Send>>;

type Loader<T> = Box<dyn Fn(CancellationToken) -> LoadFuture<T> + Send + Sync>;

#[derive(Debug)]
struct State<T> {
    value: T,
    last_updated: Option<Instant>,
    /// Present exactly while a load is in flight.
    refresh: Option<Completion>,
}

struct Inner<T> {
    name: &'static str,
    ttl: Duration,
    load: Loader<T>,
    lifetime: CancellationToken,
    state: Mutex<State<T>>,
}

impl<T> Inner<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Inner<T>
where
    T: Send + 'static,
{
    async fn refresh(self: Arc<Self>) {
        let started = Instant::now();
        let load = (self.load)(self.lifetime.child_token());
        // Run the loader as its own task so a panicking loader still releases waiters.
        let result = match tokio::spawn(load).await {
            Ok(result) => result,
            Err(err) => Err(Box::new(err) as LoadError),
        };

        let mut state = self.lock();
        match result {
            Ok(value) => {
                state.value = value;
                state.last_updated = Some(Instant::now());
                log::debug!(
                    "Refreshed cache `{}` in {}ms",
                    self.name,
                    started.elapsed().as_millis()
                );
            }
            Err(err) => {
                log::warn!("failed to refresh cache `{}`: {}", self.name, err);
            }
        }
        if let Some(completion) = state.refresh.take() {
            completion.fire();
        }
    }
}

/// A single-value cache whose refreshes are coalesced into one in-flight load.
///
/// Cloning a `RefreshCache` returns another handle to the same cache.
///
/// # Examples
///
/// ```
/// # use std::time::Duration;
/// # use docker_exporter::cache::RefreshCache;
/// # use tokio_util::sync::CancellationToken;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = RefreshCache::new("answer", Duration::from_secs(60), |_lifetime| async {
///     Ok::<u64, docker_exporter::cache::LoadError>(42)
/// });
/// let value = cache.get_values(&CancellationToken::new()).await;
/// assert_eq!(value, 42);
/// # }
/// ```
pub struct RefreshCache<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for RefreshCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for RefreshCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCache")
            .field("name", &self.inner.name)
            .field("ttl", &self.inner.ttl)
            .finish_non_exhaustive()
    }
}

impl<T> RefreshCache<T>
where
    T: Clone + Default + Send + 'static,
{
    /// Creates a cold cache.
    ///
    /// # Arguments
    ///
    /// * `name` - Name used in log messages.
    /// * `ttl` - Age after which a loaded value is considered stale.
    /// * `load` - Produces a fresh value. It receives the cache's lifetime token,
    ///   which is only cancelled by [`RefreshCache::close`].
    pub fn new<F, Fut>(name: &'static str, ttl: Duration, load: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
    {
        let load: Loader<T> = Box::new(move |token| Box::pin(load(token)));
        Self {
            inner: Arc::new(Inner {
                name,
                ttl,
                load,
                lifetime: CancellationToken::new(),
                state: Mutex::new(State {
                    value: T::default(),
                    last_updated: None,
                    refresh: None,
                }),
            }),
        }
    }

    /// Returns the cached value, refreshing it if required.
    ///
    /// `token` only bounds how long this caller waits on a cold cache. When it
    /// fires first, `T::default()` is returned and the refresh keeps running.
    pub async fn get_values(&self, token: &CancellationToken) -> T {
        let waiter = {
            let mut state = self.inner.lock();
            match state.last_updated {
                Some(updated) => {
                    if updated.elapsed() >= self.inner.ttl && state.refresh.is_none() {
                        log::debug!("Refreshing stale cache `{}`", self.inner.name);
                        drop(self.start_refresh(&mut state));
                    }
                    return state.value.clone();
                }
                None => match state.refresh.as_ref() {
                    Some(in_flight) => in_flight.subscribe(),
                    None => {
                        log::debug!("Loading cold cache `{}`", self.inner.name);
                        self.start_refresh(&mut state)
                    }
                },
            }
        };

        tokio::select! {
            biased;
            () = waiter.wait() => self.inner.lock().value.clone(),
            () = token.cancelled() => {
                log::debug!("Gave up waiting on cold cache `{}`", self.inner.name);
                T::default()
            }
        }
    }

    fn start_refresh(&self, state: &mut State<T>) -> Waiter {
        let completion = Completion::new();
        let waiter = completion.subscribe();
        state.refresh = Some(completion);

        tokio::spawn(Arc::clone(&self.inner).refresh());
        waiter
    }

    /// Returns when the value was last loaded successfully, if ever.
    pub fn last_updated(&self) -> Option<Instant> {
        self.inner.lock().last_updated
    }

    /// Returns `true` while a load is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.lock().refresh.is_some()
    }

    /// Cancels the lifetime token handed to loaders.
    pub fn close(&self) {
        self.inner.lifetime.cancel();
    }
}
