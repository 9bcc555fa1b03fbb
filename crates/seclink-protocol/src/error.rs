use crate::types::{LinkType, MemberId};

/// Protocol-level errors.
///
/// Verification failures are not errors: `verify` reports a bare `false`
/// and the detailed [`Verdict`](crate::signer::Verdict) stays local.
#[derive(Debug, thiserror::Error)]
pub enum SecureLinkError {
    #[error("member not authorized: {member}")]
    Unauthorized { member: MemberId },

    #[error("destination not allowed by route policy: {destination}")]
    PolicyViolation { destination: MemberId },

    #[error("message is already signed")]
    AlreadySigned,

    #[error("transport over {link} failed: {reason}")]
    Transport { link: LinkType, reason: String },

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid member id: {0:?}")]
    InvalidMemberId(String),

    #[error("unknown link type: {0}")]
    UnknownLink(String),

    #[error("unknown priority: {0}")]
    UnknownPriority(String),
}

impl From<rmp_serde::encode::Error> for SecureLinkError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SecureLinkError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for SecureLinkError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SecureLinkError::Deserialization(e.to_string())
    }
}

impl From<serde_json::Error> for SecureLinkError {
    fn from(e: serde_json::Error) -> Self {
        SecureLinkError::Serialization(e.to_string())
    }
}

/// Error reported by a transport channel. The router wraps it into
/// [`SecureLinkError::Transport`] together with the link it came from.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ChannelError {
    pub reason: String,
}

impl ChannelError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
