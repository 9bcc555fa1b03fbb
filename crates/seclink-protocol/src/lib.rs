//! Secure link protocol core.
//!
//! Authenticated, replay-protected point-to-point messaging for a closed
//! group of members, plus policy-driven selection among heterogeneous
//! transport links (direct cellular, hardware secure device, satellite).
//!
//! Auth: HMAC-SHA-256 over a canonical sorted-key JSON encoding.
//! Wire format: MessagePack.
//!
//! Receive path: [`MembershipRegistry`] → [`signer::verify`] →
//! [`ReplayGuard`]. Send path: [`LinkRouter`] picks a link under a
//! [`RoutePolicy`] and hands bytes to that link's [`LinkChannel`].

pub mod config;
pub mod error;
pub mod membership;
pub mod message;
pub mod policy;
pub mod replay;
pub mod router;
pub mod signer;
pub mod transport;
pub mod types;
pub mod verifier;

pub use config::ProtocolConfig;
pub use error::{ChannelError, SecureLinkError};
pub use membership::MembershipRegistry;
pub use message::{MessageBuilder, SecureMessage, DEFAULT_TTL_SECS};
pub use policy::{RoutePolicy, RoutePolicyBuilder};
pub use replay::{GuardConfig, GuardDecision, ReplayGuard};
pub use router::{LinkRouter, LinkSelection, LinkStats, SelectionReason};
pub use signer::{sign, verify, verify_at, Verdict};
pub use transport::{ChannelSet, LinkChannel, RecordingChannel};
pub use types::{now_secs, LinkType, MemberId, Priority};
pub use verifier::{Verifier, VerifierStats};
