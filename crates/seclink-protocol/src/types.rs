use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SecureLinkError;

// ── Member identity ────────────────────────────────────────────────────

/// Identity of a group member.
///
/// Opaque to the protocol: compared byte-for-byte, never normalized.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    /// Wrap a raw identity string. Empty identities are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self, SecureLinkError> {
        let id = id.into();
        if id.is_empty() {
            return Err(SecureLinkError::InvalidMemberId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MemberId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MemberId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for MemberId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for MemberId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberId({})", self.0)
    }
}

impl FromStr for MemberId {
    type Err = SecureLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ── Priority ───────────────────────────────────────────────────────────

/// Application-level urgency. Signed as its ordinal; never consulted by
/// verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Low,
        Priority::Normal,
        Priority::High,
        Priority::Critical,
    ];

    /// Ordinal carried in the canonical encoding.
    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(value: u8) -> Option<Self> {
        match value {
            1 => Some(Priority::Low),
            2 => Some(Priority::Normal),
            3 => Some(Priority::High),
            4 => Some(Priority::Critical),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Priority {
    type Err = SecureLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Priority::ALL
            .into_iter()
            .find(|p| p.name() == lowered)
            .or_else(|| lowered.parse::<u8>().ok().and_then(Priority::from_ordinal))
            .ok_or_else(|| SecureLinkError::UnknownPriority(s.to_string()))
    }
}

// Serialized as the ordinal so the wire form matches the signed form.
impl Serialize for Priority {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.ordinal())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        Priority::from_ordinal(value)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown priority ordinal {value}")))
    }
}

// ── Link types ─────────────────────────────────────────────────────────

/// A transport link variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    /// Direct TLS/HTTPS from the host device over cellular or wired networks.
    DirectCell,
    /// USB/BLE hand-off to a hardware-secured device.
    SecureDevice,
    /// Satellite modem uplink.
    Satellite,
}

impl LinkType {
    pub const ALL: [LinkType; 3] = [LinkType::DirectCell, LinkType::SecureDevice, LinkType::Satellite];

    pub fn name(self) -> &'static str {
        match self {
            LinkType::DirectCell => "direct_cell",
            LinkType::SecureDevice => "secure_device",
            LinkType::Satellite => "satellite",
        }
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LinkType {
    type Err = SecureLinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase().replace('-', "_");
        LinkType::ALL
            .into_iter()
            .find(|l| l.name() == lowered)
            .ok_or_else(|| SecureLinkError::UnknownLink(s.to_string()))
    }
}

/// Current wall-clock time in whole seconds since the Unix epoch.
pub fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
