use std::time::Duration;

use crate::error::SecureLinkError;
use crate::replay::{GuardConfig, ReplayGuard};

/// Environment variable overriding the default replay window (seconds).
pub const REPLAY_WINDOW_ENV: &str = "SECLINK_REPLAY_WINDOW_SECS";

/// Default replay window in seconds.
pub const DEFAULT_REPLAY_WINDOW_SECS: i64 = 300;

/// Tunables for verification and routing.
///
/// ```rust
/// use seclink_protocol::ProtocolConfig;
///
/// let config = ProtocolConfig::new()
///     .replay_window_secs(600)
///     .guard_capacity(50_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Minimum time an accepted nonce is remembered, on top of the
    /// message's own `ttl`. Does not affect acceptance.
    pub replay_window_secs: i64,
    pub guard: GuardConfig,
    /// Upper bound on a single channel hand-off. `None` leaves timeouts to
    /// the channel.
    pub dispatch_timeout: Option<Duration>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            replay_window_secs: DEFAULT_REPLAY_WINDOW_SECS,
            guard: GuardConfig::default(),
            dispatch_timeout: None,
        }
    }
}

impl ProtocolConfig {
    /// Defaults, with `SECLINK_REPLAY_WINDOW_SECS` applied if set and valid.
    pub fn new() -> Self {
        let replay_window_secs = std::env::var(REPLAY_WINDOW_ENV)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|secs| *secs >= 0)
            .unwrap_or(DEFAULT_REPLAY_WINDOW_SECS);

        Self {
            replay_window_secs,
            ..Self::default()
        }
    }

    pub fn replay_window_secs(mut self, secs: i64) -> Self {
        self.replay_window_secs = secs;
        self
    }

    pub fn guard_bucket_width(mut self, secs: i64) -> Self {
        self.guard.bucket_width = secs;
        self
    }

    pub fn guard_capacity(mut self, capacity: usize) -> Self {
        self.guard.capacity = capacity;
        self
    }

    pub fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), SecureLinkError> {
        if self.replay_window_secs < 0 {
            return Err(SecureLinkError::InvalidConfig(
                "replay window must not be negative".into(),
            ));
        }
        if self.dispatch_timeout == Some(Duration::ZERO) {
            return Err(SecureLinkError::InvalidConfig(
                "dispatch timeout must be non-zero".into(),
            ));
        }
        self.guard.validate()
    }

    /// A fresh replay guard sized by this config.
    pub fn guard(&self) -> ReplayGuard {
        ReplayGuard::new(self.guard)
    }
}
