//! Receiver-side convenience: one handle bundling key, registry, guard and
//! replay window, with per-verdict counters.

use std::sync::Arc;

use seclink_metrics::Counter;
use serde::Serialize;
use tracing::warn;

use crate::config::ProtocolConfig;
use crate::membership::MembershipRegistry;
use crate::message::SecureMessage;
use crate::replay::ReplayGuard;
use crate::signer::{self, Verdict};
use crate::types::now_secs;

/// Counts of verification outcomes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifierStats {
    pub accepted: Counter,
    pub unauthorized: Counter,
    pub stale: Counter,
    pub replayed: Counter,
    pub bad_signature: Counter,
    pub guard_full: Counter,
    /// Inbound bytes that did not decode as a message.
    pub malformed: Counter,
}

impl VerifierStats {
    fn record(&self, verdict: Verdict) {
        match verdict {
            Verdict::Accepted => self.accepted.inc(),
            Verdict::Unauthorized => self.unauthorized.inc(),
            Verdict::Stale => self.stale.inc(),
            Verdict::Replayed => self.replayed.inc(),
            Verdict::BadSignature => self.bad_signature.inc(),
            Verdict::GuardFull => self.guard_full.inc(),
        }
    }

    pub fn rejected(&self) -> u64 {
        self.unauthorized.get()
            + self.stale.get()
            + self.replayed.get()
            + self.bad_signature.get()
            + self.guard_full.get()
            + self.malformed.get()
    }
}

pub struct Verifier {
    secret_key: Vec<u8>,
    registry: Arc<MembershipRegistry>,
    guard: Arc<ReplayGuard>,
    replay_window_secs: i64,
    stats: VerifierStats,
}

impl Verifier {
    pub fn new(
        secret_key: impl Into<Vec<u8>>,
        registry: Arc<MembershipRegistry>,
        guard: Arc<ReplayGuard>,
        replay_window_secs: i64,
    ) -> Self {
        Self {
            secret_key: secret_key.into(),
            registry,
            guard,
            replay_window_secs,
            stats: VerifierStats::default(),
        }
    }

    /// Build a verifier with a fresh guard sized by `config`.
    pub fn from_config(
        secret_key: impl Into<Vec<u8>>,
        registry: Arc<MembershipRegistry>,
        config: &ProtocolConfig,
    ) -> Self {
        Self::new(
            secret_key,
            registry,
            Arc::new(config.guard()),
            config.replay_window_secs,
        )
    }

    pub fn guard(&self) -> &Arc<ReplayGuard> {
        &self.guard
    }

    pub fn registry(&self) -> &Arc<MembershipRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> &VerifierStats {
        &self.stats
    }

    pub fn verify(&self, message: &SecureMessage) -> bool {
        self.check_at(message, now_secs()).is_accepted()
    }

    pub fn check_at(&self, message: &SecureMessage, now: i64) -> Verdict {
        let verdict = signer::check(
            &self.secret_key,
            message,
            &self.registry,
            self.replay_window_secs,
            &self.guard,
            now,
        );
        self.stats.record(verdict);
        verdict
    }

    /// Decode wire bytes and verify. Returns the message only if accepted.
    pub fn accept_bytes(&self, data: &[u8]) -> Option<SecureMessage> {
        self.accept_bytes_at(data, now_secs())
    }

    pub fn accept_bytes_at(&self, data: &[u8], now: i64) -> Option<SecureMessage> {
        let message = match SecureMessage::from_bytes(data) {
            Ok(m) => m,
            Err(e) => {
                self.stats.malformed.inc();
                warn!(bytes = data.len(), error = %e, "dropping undecodable message");
                return None;
            }
        };
        self.check_at(&message, now)
            .is_accepted()
            .then_some(message)
    }
}

impl std::fmt::Debug for Verifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("Verifier")
            .field("replay_window_secs", &self.replay_window_secs)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageBuilder;
    use crate::types::MemberId;

    const T0: i64 = 1_700_000_000;

    fn setup() -> (Verifier, Arc<MembershipRegistry>) {
        let registry = Arc::new(MembershipRegistry::with_members(["A", "B"]));
        let v = Verifier::from_config(b"k".to_vec(), registry.clone(), &ProtocolConfig::default());
        (v, registry)
    }

    fn signed(registry: &MembershipRegistry, nonce: &str) -> SecureMessage {
        MessageBuilder::new(MemberId::from("A"), MemberId::from("B"), "hi")
            .timestamp(T0)
            .nonce(nonce)
            .sign(b"k", registry)
            .unwrap()
    }

    #[test]
    fn counts_each_verdict() {
        let (v, registry) = setup();
        let msg = signed(&registry, "n1");

        assert_eq!(v.check_at(&msg, T0), Verdict::Accepted);
        assert_eq!(v.check_at(&msg, T0), Verdict::Replayed);
        assert_eq!(v.check_at(&signed(&registry, "n2"), T0 + 10_000), Verdict::Stale);

        let stats = v.stats();
        assert_eq!(stats.accepted.get(), 1);
        assert_eq!(stats.replayed.get(), 1);
        assert_eq!(stats.stale.get(), 1);
        assert_eq!(stats.rejected(), 2);
    }

    #[test]
    fn accept_bytes_decodes_and_verifies() {
        let (v, registry) = setup();
        let bytes = signed(&registry, "wire").to_bytes().unwrap();

        let accepted = v.accept_bytes_at(&bytes, T0).expect("accepted");
        assert_eq!(accepted.payload, "hi");
        assert!(v.accept_bytes_at(&bytes, T0).is_none(), "replay");
        assert!(v.accept_bytes_at(b"garbage", T0).is_none());
        assert_eq!(v.stats().malformed.get(), 1);
    }

    #[test]
    fn debug_hides_key() {
        let (v, _) = setup();
        let dbg = format!("{v:?}");
        assert!(!dbg.contains("secret_key"));
    }
}
