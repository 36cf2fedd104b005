//! Process-wide exporter status.
//!
//! [`Status`] is created once at startup and shared by handle with every
//! consumer. It carries the one-way [`ReadinessGate`] and the [`ErrorRegistry`]
//! of the most recent failure per daemon operation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

/// One-way readiness flag: starts not ready, flips to ready once, never reverts.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    ready: AtomicBool,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` once [`ReadinessGate::set_ready`] has been called.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Marks the exporter as ready. Idempotent.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn set_ready(&self) -> bool {
        let flipped = !self.ready.swap(true, Ordering::AcqRel);
        if flipped {
            log::debug!("Readiness gate opened");
        }
        flipped
    }
}

/// Last error per daemon operation, cleared again by the next successful call.
///
/// Cloning returns another handle to the same registry.
#[derive(Debug, Clone, Default)]
pub struct ErrorRegistry {
    errors: Arc<DashMap<&'static str, String>>,
}

impl ErrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of `operation`: an error is stored, a success clears it.
    pub fn record<T, E>(&self, operation: &'static str, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => self.clear(operation),
            Err(err) => self.set(operation, err),
        }
    }

    pub fn set(&self, operation: &'static str, err: impl std::fmt::Display) {
        self.errors.insert(operation, err.to_string());
    }

    pub fn clear(&self, operation: &'static str) {
        self.errors.remove(operation);
    }

    /// Returns `true` if no operation currently has an error recorded.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns a sorted snapshot of all recorded errors.
    pub fn descriptions(&self) -> BTreeMap<&'static str, String> {
        self.errors
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }
}

/// Shared status handle passed to the collector, warm-up and HTTP layers.
#[derive(Debug, Default)]
pub struct Status {
    readiness: ReadinessGate,
    errors: ErrorRegistry,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> &ErrorRegistry {
        &self.errors
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn set_ready(&self) -> bool {
        self.readiness.set_ready()
    }
}
