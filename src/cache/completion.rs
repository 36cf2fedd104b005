use tokio::sync::watch;

/// One-shot completion event with any number of waiters.
///
/// Waiters created after [`Completion::fire`] resolve immediately, so a caller
/// that subscribes late never misses the event.
#[derive(Debug)]
pub struct Completion {
    tx: watch::Sender<bool>,
}

impl Completion {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Returns a waiter that resolves once this completion fires.
    pub fn subscribe(&self) -> Waiter {
        Waiter {
            rx: self.tx.subscribe(),
        }
    }

    /// Wakes every current and future waiter. Firing twice has no further effect.
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`Completion::subscribe`].
#[derive(Debug)]
pub struct Waiter {
    rx: watch::Receiver<bool>,
}

impl Waiter {
    /// Waits until the completion fires.
    ///
    /// Also returns if the [`Completion`] is dropped without firing. The cache
    /// keeps its completion until the refresh task fires it, which that task
    /// does even when the loader panics.
    pub async fn wait(mut self) {
        let _ = self.rx.wait_for(|done| *done).await;
    }
}
