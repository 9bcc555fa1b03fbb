//! Message signing and verification.
//!
//! The tag is HMAC-SHA-256 over [`SecureMessage::canonical_bytes`], stored
//! as lowercase hex. Verification compares tags in constant time and only
//! touches the replay guard once every other check has passed.

use std::fmt;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::error::SecureLinkError;
use crate::membership::MembershipRegistry;
use crate::message::SecureMessage;
use crate::replay::{GuardDecision, ReplayGuard};
use crate::types::now_secs;

type HmacSha256 = Hmac<Sha256>;

/// Length of the raw tag in bytes (hex form is twice that).
pub const TAG_LEN: usize = 32;

/// Detailed verification outcome, for local logging and metrics only.
///
/// Callers deciding whether to accept a message should use [`verify`];
/// the reason a message was rejected must not be echoed back to its sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Accepted,
    /// Sender or recipient is not a member.
    Unauthorized,
    /// `now > timestamp + ttl`.
    Stale,
    /// Nonce already consumed.
    Replayed,
    /// Tag missing, malformed, or not matching the canonical bytes.
    BadSignature,
    /// The replay guard is saturated; fail closed.
    GuardFull,
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        self == Verdict::Accepted
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Accepted => "accepted",
            Verdict::Unauthorized => "unauthorized",
            Verdict::Stale => "stale",
            Verdict::Replayed => "replayed",
            Verdict::BadSignature => "bad_signature",
            Verdict::GuardFull => "guard_full",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sign `message` with `secret_key`.
///
/// Both parties must be members, otherwise [`SecureLinkError::Unauthorized`]
/// names the first offender and nothing is signed. A message is signed
/// exactly once: an already-signed message yields
/// [`SecureLinkError::AlreadySigned`].
pub fn sign(
    secret_key: &[u8],
    mut message: SecureMessage,
    registry: &MembershipRegistry,
) -> Result<SecureMessage, SecureLinkError> {
    if let Some(member) =
        registry.first_unauthorized(&[&message.sender_id, &message.recipient_id])
    {
        return Err(SecureLinkError::Unauthorized {
            member: member.clone(),
        });
    }
    if message.is_signed() {
        return Err(SecureLinkError::AlreadySigned);
    }

    let tag = compute_tag(secret_key, &message.canonical_bytes())?;
    message.signature = hex::encode(tag);
    debug!(
        sender = %message.sender_id,
        recipient = %message.recipient_id,
        nonce = %message.nonce,
        "signed message"
    );
    Ok(message)
}

/// Verify `message` against the current clock.
///
/// Returns `false`, never an error, when the message is unauthorized,
/// stale, replayed, or carries a bad tag. On success the nonce is consumed
/// in `guard`, so a second call with the same message fails.
///
/// `replay_window_seconds` only extends how long the nonce is retained;
/// acceptance is governed by the message's own `ttl`.
pub fn verify(
    secret_key: &[u8],
    message: &SecureMessage,
    registry: &MembershipRegistry,
    replay_window_seconds: i64,
    guard: &ReplayGuard,
) -> bool {
    verify_at(
        secret_key,
        message,
        registry,
        replay_window_seconds,
        guard,
        now_secs(),
    )
}

/// [`verify`] with an explicit clock.
pub fn verify_at(
    secret_key: &[u8],
    message: &SecureMessage,
    registry: &MembershipRegistry,
    replay_window_seconds: i64,
    guard: &ReplayGuard,
    now: i64,
) -> bool {
    check(secret_key, message, registry, replay_window_seconds, guard, now).is_accepted()
}

/// Run the full verification pipeline and report why a message was
/// rejected. Same side effects as [`verify_at`].
pub fn check(
    secret_key: &[u8],
    message: &SecureMessage,
    registry: &MembershipRegistry,
    replay_window_seconds: i64,
    guard: &ReplayGuard,
    now: i64,
) -> Verdict {
    let verdict = evaluate(secret_key, message, registry, replay_window_seconds, guard, now);
    if verdict.is_accepted() {
        debug!(sender = %message.sender_id, nonce = %message.nonce, "message accepted");
    } else {
        warn!(
            sender = %message.sender_id,
            recipient = %message.recipient_id,
            verdict = %verdict,
            "message rejected"
        );
    }
    verdict
}

fn evaluate(
    secret_key: &[u8],
    message: &SecureMessage,
    registry: &MembershipRegistry,
    replay_window_seconds: i64,
    guard: &ReplayGuard,
    now: i64,
) -> Verdict {
    if !registry.all_authorized(&[&message.sender_id, &message.recipient_id]) {
        return Verdict::Unauthorized;
    }
    if message.is_stale_at(now) {
        return Verdict::Stale;
    }
    // Cheap early exit; the authoritative check is the insert below.
    if guard.contains(&message.sender_id, &message.nonce) {
        return Verdict::Replayed;
    }
    if !tag_matches(secret_key, message) {
        return Verdict::BadSignature;
    }

    let retain_until = message
        .expires_at()
        .max(now.saturating_add(replay_window_seconds.max(0)));
    match guard.check_and_record(&message.sender_id, &message.nonce, retain_until, now) {
        GuardDecision::Recorded => Verdict::Accepted,
        GuardDecision::Replayed => Verdict::Replayed,
        GuardDecision::Full => Verdict::GuardFull,
    }
}

/// HMAC-SHA-256 of `data` under `key`.
pub fn compute_tag(key: &[u8], data: &[u8]) -> Result<[u8; TAG_LEN], SecureLinkError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| SecureLinkError::Crypto(format!("HMAC key init failed: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time comparison of the message's tag with the recomputed one.
fn tag_matches(key: &[u8], message: &SecureMessage) -> bool {
    let Ok(provided) = hex::decode(&message.signature) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(&message.canonical_bytes());
    mac.verify_slice(&provided).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageBuilder;
    use crate::types::{MemberId, Priority};

    const KEY: &[u8] = b"k";
    const T0: i64 = 1_700_000_000;
    const WINDOW: i64 = 300;

    fn registry() -> MembershipRegistry {
        MembershipRegistry::with_members(["A", "B"])
    }

    fn unsigned(payload: &str) -> SecureMessage {
        MessageBuilder::new(MemberId::from("A"), MemberId::from("B"), payload)
            .timestamp(T0)
            .ttl(300)
            .nonce("n1")
            .build()
    }

    fn signed(payload: &str) -> SecureMessage {
        sign(KEY, unsigned(payload), &registry()).expect("sign")
    }

    #[test]
    fn known_answer_vector() {
        let msg = signed("hello");
        assert_eq!(
            msg.signature,
            "5550a013e4aeb2106851dcb87ea6cf349b1c14c038cf10ac2aace0539369e23b"
        );
    }

    #[test]
    fn known_answer_vector_non_ascii() {
        let msg = signed("caf\u{e9} \u{1f6f0}");
        assert_eq!(
            msg.signature,
            "6187892289fb0fb683da27086c1d002a3ae334f367de9c023d52a23b8a023296"
        );
    }

    #[test]
    fn sign_then_verify_once() {
        let reg = registry();
        let guard = ReplayGuard::default();
        let msg = signed("hello");

        assert!(verify_at(KEY, &msg, &reg, WINDOW, &guard, T0 + 1));
        assert!(!verify_at(KEY, &msg, &reg, WINDOW, &guard, T0 + 2), "replay must fail");
        assert_eq!(
            check(KEY, &msg, &reg, WINDOW, &guard, T0 + 3),
            Verdict::Replayed
        );
    }

    #[test]
    fn sign_rejects_unauthorized_sender() {
        let reg = registry();
        reg.remove_member("A");
        let err = sign(KEY, unsigned("x"), &reg).unwrap_err();
        match err {
            SecureLinkError::Unauthorized { member } => assert_eq!(member.as_str(), "A"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn sign_rejects_unauthorized_recipient() {
        let reg = registry();
        reg.remove_member("B");
        let err = sign(KEY, unsigned("x"), &reg).unwrap_err();
        assert!(matches!(err, SecureLinkError::Unauthorized { member } if member.as_str() == "B"));
    }

    #[test]
    fn sign_twice_rejected() {
        let msg = signed("x");
        let err = sign(KEY, msg, &registry()).unwrap_err();
        assert!(matches!(err, SecureLinkError::AlreadySigned));
    }

    #[test]
    fn verify_unauthorized_is_false_not_error() {
        let reg = registry();
        let guard = ReplayGuard::default();
        let msg = signed("x");
        reg.remove_member("B");
        assert_eq!(
            check(KEY, &msg, &reg, WINDOW, &guard, T0),
            Verdict::Unauthorized
        );
        assert!(guard.is_empty(), "rejections must not consume the nonce");
    }

    #[test]
    fn tampering_breaks_signature() {
        let reg = registry();
        let tampers: [fn(&mut SecureMessage); 6] = [
            |m| m.payload.push('!'),
            |m| m.timestamp -= 1,
            |m| m.ttl += 1,
            |m| m.priority = Priority::Critical,
            |m| m.nonce = "n2".into(),
            |m| m.recipient_id = MemberId::from("A"),
        ];
        for tamper in tampers {
            let guard = ReplayGuard::default();
            let mut msg = signed("payload");
            tamper(&mut msg);
            assert_eq!(
                check(KEY, &msg, &reg, WINDOW, &guard, T0),
                Verdict::BadSignature
            );
            assert!(guard.is_empty());
        }
    }

    #[test]
    fn wrong_key_rejected() {
        let guard = ReplayGuard::default();
        let msg = signed("x");
        assert!(!verify_at(b"other", &msg, &registry(), WINDOW, &guard, T0));
    }

    #[test]
    fn malformed_signatures_rejected() {
        let reg = registry();
        let guard = ReplayGuard::default();
        let all_zero = "00".repeat(TAG_LEN);
        for bad in ["", "zz", "abcd", all_zero.as_str()] {
            let mut msg = unsigned("x");
            msg.signature = bad.to_string();
            assert_eq!(check(KEY, &msg, &reg, WINDOW, &guard, T0), Verdict::BadSignature);
        }
    }

    #[test]
    fn stale_message_rejected_even_with_valid_tag() {
        let msg = signed("x");
        // Last fresh second.
        assert!(verify_at(KEY, &msg, &registry(), WINDOW, &ReplayGuard::default(), T0 + 300));
        assert_eq!(
            check(KEY, &msg, &registry(), WINDOW, &ReplayGuard::default(), T0 + 301),
            Verdict::Stale
        );
    }

    #[test]
    fn zero_and_negative_ttl_always_stale() {
        let reg = registry();
        for ttl in [0, -1, -3600] {
            let guard = ReplayGuard::default();
            let msg = MessageBuilder::new("A".into(), "B".into(), "x")
                .timestamp(T0)
                .ttl(ttl)
                .sign(KEY, &reg)
                .unwrap();
            assert_eq!(check(KEY, &msg, &reg, WINDOW, &guard, T0 + 1), Verdict::Stale);
        }
    }

    #[test]
    fn empty_payload_is_valid() {
        let guard = ReplayGuard::default();
        let msg = signed("");
        assert!(verify_at(KEY, &msg, &registry(), WINDOW, &guard, T0));
    }

    #[test]
    fn nonce_retained_for_longest_of_window_and_ttl() {
        let reg = registry();
        let guard = ReplayGuard::default();
        let msg = MessageBuilder::new("A".into(), "B".into(), "long-lived")
            .timestamp(T0)
            .ttl(3600)
            .sign(KEY, &reg)
            .unwrap();

        assert!(verify_at(KEY, &msg, &reg, 60, &guard, T0));
        // Well past the replay window, still inside ttl: must remain a replay.
        guard.purge_expired(T0 + 1800);
        assert_eq!(check(KEY, &msg, &reg, 60, &guard, T0 + 1800), Verdict::Replayed);
    }

    #[test]
    fn verify_uses_wall_clock() {
        let reg = registry();
        let guard = ReplayGuard::default();
        let msg = MessageBuilder::new("A".into(), "B".into(), "now")
            .ttl(300)
            .sign(KEY, &reg)
            .unwrap();
        assert!(verify(KEY, &msg, &reg, WINDOW, &guard));
        assert!(!verify(KEY, &msg, &reg, WINDOW, &guard));
    }

    #[test]
    fn compute_tag_matches_rfc4231_case_2() {
        let tag = compute_tag(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn verdict_names() {
        assert_eq!(Verdict::BadSignature.to_string(), "bad_signature");
        assert!(Verdict::Accepted.is_accepted());
        assert!(!Verdict::GuardFull.is_accepted());
    }
}
