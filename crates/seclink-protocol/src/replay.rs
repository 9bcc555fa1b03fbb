//! Replay guard: remembers which `(sender, nonce)` pairs have been accepted.
//!
//! Entries live in time buckets keyed by the end of their retention period.
//! A nonce is retained until `max(arrival + replay_window, timestamp + ttl)`,
//! so it is never forgotten while its message could still pass the
//! staleness check. Expired buckets are dropped wholesale.
//!
//! Check-and-insert runs under one mutex: two concurrent verifications of
//! the same nonce cannot both record it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::SecureLinkError;
use crate::types::MemberId;

/// Default bucket width in seconds.
pub const DEFAULT_BUCKET_WIDTH_SECS: i64 = 60;

/// Default maximum number of retained nonces (memory bound).
pub const DEFAULT_GUARD_CAPACITY: usize = 100_000;

type ReplayKey = (MemberId, String);

/// Sizing of a [`ReplayGuard`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    /// Retention granularity in seconds. Entries may outlive their deadline
    /// by up to one bucket width.
    pub bucket_width: i64,
    /// Hard cap on retained entries.
    pub capacity: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            bucket_width: DEFAULT_BUCKET_WIDTH_SECS,
            capacity: DEFAULT_GUARD_CAPACITY,
        }
    }
}

impl GuardConfig {
    pub fn validate(&self) -> Result<(), SecureLinkError> {
        if self.bucket_width <= 0 {
            return Err(SecureLinkError::InvalidConfig(
                "guard bucket width must be positive".into(),
            ));
        }
        if self.capacity == 0 {
            return Err(SecureLinkError::InvalidConfig(
                "guard capacity must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Result of [`ReplayGuard::check_and_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// First sighting; the nonce is now consumed.
    Recorded,
    /// Already consumed within the retained window.
    Replayed,
    /// Guard is at capacity with live entries; nothing was recorded.
    Full,
}

#[derive(Debug, Default)]
struct GuardState {
    /// key → end of the bucket holding it.
    entries: HashMap<ReplayKey, i64>,
    /// bucket end → keys retained until then.
    buckets: BTreeMap<i64, Vec<ReplayKey>>,
}

impl GuardState {
    /// Drop every bucket that ended before `now`. Returns entries removed.
    fn purge(&mut self, now: i64) -> usize {
        let live = self.buckets.split_off(&now);
        let expired = std::mem::replace(&mut self.buckets, live);
        let mut removed = 0;
        for key in expired.into_values().flatten() {
            if self.entries.remove(&key).is_some() {
                removed += 1;
            }
        }
        removed
    }
}

#[derive(Debug)]
pub struct ReplayGuard {
    config: GuardConfig,
    state: Mutex<GuardState>,
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

impl ReplayGuard {
    /// Create a guard. Out-of-range settings are clamped (width and
    /// capacity of at least 1); use [`GuardConfig::validate`] to reject them.
    pub fn new(config: GuardConfig) -> Self {
        let config = GuardConfig {
            bucket_width: config.bucket_width.max(1),
            capacity: config.capacity.max(1),
        };
        Self {
            config,
            state: Mutex::new(GuardState::default()),
        }
    }

    pub fn config(&self) -> GuardConfig {
        self.config
    }

    /// Whether `(sender, nonce)` is currently retained.
    pub fn contains(&self, sender: &MemberId, nonce: &str) -> bool {
        self.lock()
            .entries
            .contains_key(&(sender.clone(), nonce.to_string()))
    }

    /// Atomically record `(sender, nonce)` unless already present.
    ///
    /// `retain_until` is the last second the entry must be kept;
    /// `now` drives eviction of older buckets.
    pub fn check_and_record(
        &self,
        sender: &MemberId,
        nonce: &str,
        retain_until: i64,
        now: i64,
    ) -> GuardDecision {
        let mut state = self.lock();
        let purged = state.purge(now);
        if purged > 0 {
            debug!(purged, "evicted expired nonces");
        }

        let key = (sender.clone(), nonce.to_string());
        if state.entries.contains_key(&key) {
            return GuardDecision::Replayed;
        }

        if state.entries.len() >= self.config.capacity {
            warn!(
                capacity = self.config.capacity,
                sender = %sender,
                "replay guard full, refusing new nonce"
            );
            return GuardDecision::Full;
        }

        let bucket = self.bucket_end(retain_until.max(now));
        state.entries.insert(key.clone(), bucket);
        state.buckets.entry(bucket).or_default().push(key);
        GuardDecision::Recorded
    }

    /// Evict everything whose retention ended before `now`.
    pub fn purge_expired(&self, now: i64) -> usize {
        self.lock().purge(now)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.lock().buckets.len()
    }

    /// Round `deadline` up to the end of its bucket.
    fn bucket_end(&self, deadline: i64) -> i64 {
        let width = self.config.bucket_width;
        let index = deadline.div_euclid(width);
        let rounded_up = if deadline.rem_euclid(width) == 0 {
            index
        } else {
            index.saturating_add(1)
        };
        rounded_up.saturating_mul(width)
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const T0: i64 = 1_700_000_000;

    fn member(name: &str) -> MemberId {
        MemberId::from(name)
    }

    fn guard(width: i64, capacity: usize) -> ReplayGuard {
        ReplayGuard::new(GuardConfig {
            bucket_width: width,
            capacity,
        })
    }

    #[test]
    fn first_sighting_recorded_second_replayed() {
        let g = ReplayGuard::default();
        let a = member("A");
        assert_eq!(g.check_and_record(&a, "n1", T0 + 300, T0), GuardDecision::Recorded);
        assert!(g.contains(&a, "n1"));
        assert_eq!(g.check_and_record(&a, "n1", T0 + 300, T0 + 1), GuardDecision::Replayed);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn same_nonce_different_sender_allowed() {
        let g = ReplayGuard::default();
        assert_eq!(g.check_and_record(&member("A"), "n", T0 + 60, T0), GuardDecision::Recorded);
        assert_eq!(g.check_and_record(&member("B"), "n", T0 + 60, T0), GuardDecision::Recorded);
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn entries_survive_until_deadline() {
        let g = guard(10, 100);
        let a = member("A");
        g.check_and_record(&a, "n1", T0 + 25, T0);

        // Still retained at and just after the deadline (bucket rounding).
        assert_eq!(g.purge_expired(T0 + 25), 0);
        assert_eq!(g.purge_expired(T0 + 30), 0);
        assert!(g.contains(&a, "n1"));

        assert_eq!(g.purge_expired(T0 + 31), 1);
        assert!(!g.contains(&a, "n1"));
        assert!(g.is_empty());
    }

    #[test]
    fn buckets_dropped_wholesale() {
        let g = guard(60, 100);
        let a = member("A");
        for i in 0..5 {
            g.check_and_record(&a, &format!("early-{i}"), T0 + 10, T0);
        }
        g.check_and_record(&a, "late", T0 + 600, T0);
        assert_eq!(g.bucket_count(), 2);

        let removed = g.purge_expired(T0 + 200);
        assert_eq!(removed, 5);
        assert_eq!(g.bucket_count(), 1);
        assert!(g.contains(&a, "late"));
    }

    #[test]
    fn record_purges_lazily() {
        let g = guard(10, 100);
        let a = member("A");
        g.check_and_record(&a, "old", T0 + 5, T0);
        g.check_and_record(&a, "new", T0 + 1000, T0 + 500);
        assert!(!g.contains(&a, "old"));
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn deadline_in_the_past_is_kept_until_now() {
        let g = guard(10, 100);
        let a = member("A");
        assert_eq!(g.check_and_record(&a, "n", T0 - 100, T0), GuardDecision::Recorded);
        assert_eq!(g.purge_expired(T0), 0);
    }

    #[test]
    fn full_guard_refuses_rather_than_evicting() {
        let g = guard(10, 2);
        let a = member("A");
        assert_eq!(g.check_and_record(&a, "1", T0 + 100, T0), GuardDecision::Recorded);
        assert_eq!(g.check_and_record(&a, "2", T0 + 100, T0), GuardDecision::Recorded);
        assert_eq!(g.check_and_record(&a, "3", T0 + 100, T0), GuardDecision::Full);
        // Replays are still detected when full.
        assert_eq!(g.check_and_record(&a, "1", T0 + 100, T0), GuardDecision::Replayed);

        // Once the old entries expire there is room again.
        assert_eq!(g.check_and_record(&a, "3", T0 + 500, T0 + 200), GuardDecision::Recorded);
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn bucket_rounding() {
        let g = guard(60, 10);
        assert_eq!(g.bucket_end(120), 120);
        assert_eq!(g.bucket_end(121), 180);
        assert_eq!(g.bucket_end(-1), 0);
        assert_eq!(g.bucket_end(i64::MAX), i64::MAX, "saturates instead of overflowing");
    }

    #[test]
    fn config_validation() {
        assert!(GuardConfig::default().validate().is_ok());
        assert!(GuardConfig { bucket_width: 0, capacity: 1 }.validate().is_err());
        assert!(GuardConfig { bucket_width: 1, capacity: 0 }.validate().is_err());
        // new() clamps instead of panicking
        assert_eq!(guard(0, 0).config(), GuardConfig { bucket_width: 1, capacity: 1 });
    }

    #[test]
    fn concurrent_same_nonce_recorded_once() {
        let g = Arc::new(ReplayGuard::default());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let g = Arc::clone(&g);
                std::thread::spawn(move || g.check_and_record(&member("A"), "dup", T0 + 60, T0))
            })
            .collect();
        let recorded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|d| *d == GuardDecision::Recorded)
            .count();
        assert_eq!(recorded, 1);
    }
}
