//! Minimal metrics primitives for the seclink stack.
//!
//! [`Counter`] is an atomic monotonic counter. [`Tally`] groups three of
//! them into the attempts / successes / failures triple kept per link by
//! the router. Both serialize as plain numbers so snapshots can be dumped
//! as JSON by the CLI.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A monotonically increasing counter backed by [`AtomicU64`].
///
/// Relaxed ordering throughout: these are statistics, not synchronization.
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Counter {
    fn clone(&self) -> Self {
        Self(AtomicU64::new(self.get()))
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Counter").field(&self.get()).finish()
    }
}

impl Serialize for Counter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.get().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Counter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u64::deserialize(deserializer)?;
        Ok(Self(AtomicU64::new(value)))
    }
}

// ── Tally ──────────────────────────────────────────────────────────────

/// Outcome counts for a repeated operation (e.g. dispatches over one link).
///
/// `attempts` is bumped before the operation runs, exactly one of
/// `successes` / `failures` after it returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tally {
    pub attempts: Counter,
    pub successes: Counter,
    pub failures: Counter,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start of an attempt.
    pub fn begin(&self) {
        self.attempts.inc();
    }

    /// Record the result of an attempt started with [`Tally::begin`].
    pub fn finish(&self, ok: bool) {
        if ok {
            self.successes.inc();
        } else {
            self.failures.inc();
        }
    }

    /// Attempts that have begun but not finished yet.
    pub fn in_flight(&self) -> u64 {
        self.attempts
            .get()
            .saturating_sub(self.successes.get() + self.failures.get())
    }

    /// Fraction of finished attempts that succeeded, `None` before the first one.
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.successes.get() + self.failures.get();
        if finished == 0 {
            return None;
        }
        Some(self.successes.get() as f64 / finished as f64)
    }
}
