use std::collections::BTreeMap;
use std::io;

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::Value;

use crate::error::SecureLinkError;
use crate::membership::MembershipRegistry;
use crate::signer;
use crate::types::{now_secs, MemberId, Priority};

/// Default message lifetime in seconds.
pub const DEFAULT_TTL_SECS: i64 = 300;

/// The atomic unit of communication between members.
///
/// `signature` is the lowercase hex HMAC-SHA-256 tag over
/// [`SecureMessage::canonical_bytes`]; it is empty until the message is
/// signed. Fields are public so receivers can inspect them, but any change
/// after signing invalidates the tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureMessage {
    pub sender_id: MemberId,
    pub recipient_id: MemberId,
    pub priority: Priority,
    /// Creation time, seconds since the Unix epoch (sender clock).
    pub timestamp: i64,
    /// Lifetime in seconds. Zero or negative means already stale.
    pub ttl: i64,
    /// Opaque content.
    pub payload: String,
    /// Sender-chosen unique token.
    pub nonce: String,
    #[serde(default)]
    pub signature: String,
}

impl SecureMessage {
    /// Create an unsigned message stamped with the current time and a
    /// fresh random nonce.
    pub fn new(
        sender_id: MemberId,
        recipient_id: MemberId,
        priority: Priority,
        payload: impl Into<String>,
        ttl: i64,
    ) -> Self {
        Self {
            sender_id,
            recipient_id,
            priority,
            timestamp: now_secs(),
            ttl,
            payload: payload.into(),
            nonce: fresh_nonce(),
            signature: String::new(),
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// Last second at which the message is still fresh.
    pub fn expires_at(&self) -> i64 {
        self.timestamp.saturating_add(self.ttl)
    }

    /// Stale once `now > timestamp + ttl`.
    pub fn is_stale_at(&self, now: i64) -> bool {
        now > self.expires_at()
    }

    /// The canonical bytes covered by the signature.
    ///
    /// A JSON object of every field except `signature`, keys sorted,
    /// `priority` as its ordinal, `", "` / `": "` separators and ASCII-only
    /// escaping. Sender and verifier must reproduce these bytes exactly.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut fields: BTreeMap<&'static str, Value> = BTreeMap::new();
        fields.insert("sender_id", Value::from(self.sender_id.as_str()));
        fields.insert("recipient_id", Value::from(self.recipient_id.as_str()));
        fields.insert("priority", Value::from(self.priority.ordinal()));
        fields.insert("timestamp", Value::from(self.timestamp));
        fields.insert("ttl", Value::from(self.ttl));
        fields.insert("payload", Value::from(self.payload.as_str()));
        fields.insert("nonce", Value::from(self.nonce.as_str()));

        let mut out = Vec::with_capacity(128 + self.payload.len());
        let mut ser = serde_json::Serializer::with_formatter(&mut out, CanonicalFormatter);
        // Writing strings and integers into a Vec cannot fail.
        if fields.serialize(&mut ser).is_err() {
            out.clear();
        }
        out
    }

    /// Serialize the whole message (signature included) to MessagePack.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SecureLinkError> {
        rmp_serde::to_vec_named(self).map_err(Into::into)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, SecureLinkError> {
        rmp_serde::from_slice(data).map_err(Into::into)
    }

    /// Serialize the whole message to JSON (CLI and logs).
    pub fn to_json(&self) -> Result<String, SecureLinkError> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    pub fn from_json(data: &str) -> Result<Self, SecureLinkError> {
        serde_json::from_str(data).map_err(|e| SecureLinkError::Deserialization(e.to_string()))
    }
}

/// A 122-bit random nonce (UUID v4, simple form).
pub fn fresh_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ── Builder ────────────────────────────────────────────────────────────

/// Fluent builder for unsigned or signed messages.
///
/// ```ignore
/// let msg = MessageBuilder::new("A".into(), "B".into(), "status ok")
///     .priority(Priority::High)
///     .ttl(120)
///     .sign(&key, &registry)?;
/// ```
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    sender_id: MemberId,
    recipient_id: MemberId,
    payload: String,
    priority: Priority,
    ttl: i64,
    timestamp: Option<i64>,
    nonce: Option<String>,
}

impl MessageBuilder {
    pub fn new(sender_id: MemberId, recipient_id: MemberId, payload: impl Into<String>) -> Self {
        Self {
            sender_id,
            recipient_id,
            payload: payload.into(),
            priority: Priority::default(),
            ttl: DEFAULT_TTL_SECS,
            timestamp: None,
            nonce: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn ttl(mut self, ttl: i64) -> Self {
        self.ttl = ttl;
        self
    }

    /// Override the creation time (default: now).
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Supply a caller-chosen nonce (default: random). The caller becomes
    /// responsible for its uniqueness.
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Build an unsigned message.
    pub fn build(self) -> SecureMessage {
        SecureMessage {
            sender_id: self.sender_id,
            recipient_id: self.recipient_id,
            priority: self.priority,
            timestamp: self.timestamp.unwrap_or_else(now_secs),
            ttl: self.ttl,
            payload: self.payload,
            nonce: self.nonce.unwrap_or_else(fresh_nonce),
            signature: String::new(),
        }
    }

    /// Build and sign.
    pub fn sign(
        self,
        secret_key: &[u8],
        registry: &MembershipRegistry,
    ) -> Result<SecureMessage, SecureLinkError> {
        signer::sign(secret_key, self.build(), registry)
    }
}

// ── Canonical JSON formatting ──────────────────────────────────────────

/// JSON formatter producing the canonical layout: `", "` between members,
/// `": "` after keys, and `\uXXXX` for everything outside printable ASCII.
struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    // serde_json already escapes quotes, backslashes and C0 controls before
    // calling this; whatever reaches here is written verbatim unless it is
    // DEL or non-ASCII.
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (idx, ch) in fragment.char_indices() {
            if (' '..='~').contains(&ch) {
                continue;
            }
            writer.write_all(fragment[start..idx].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = idx + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}
