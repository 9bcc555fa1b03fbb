//! Link selection and dispatch.
//!
//! Selection is pure: given the policy and the links currently up, pick one
//! deterministically. Dispatch hands `(destination, data)` to the chosen
//! link's channel exactly once. No retries, no fallback to the next link;
//! the caller owns retry policy.

use std::sync::Arc;
use std::time::Duration;

use seclink_metrics::Tally;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::SecureLinkError;
use crate::membership::MembershipRegistry;
use crate::message::SecureMessage;
use crate::policy::RoutePolicy;
use crate::transport::ChannelSet;
use crate::types::{LinkType, MemberId};

// ── Selection ──────────────────────────────────────────────────────────

/// Why a link was (or was not) selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    /// The entry at `rank` (0 = most preferred) of the preference list.
    Preferred { rank: usize },
    /// Policy requires the secure device and it is not available.
    SecureDeviceUnavailable,
    /// None of the preferred links is available.
    NoPreferredLink,
}

/// Result of link selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSelection {
    pub link: Option<LinkType>,
    pub reason: SelectionReason,
}

/// Pick a link under `policy`.
///
/// The secure-device requirement is checked first and is absolute. After
/// that the first preference present in `available` wins.
pub fn select(policy: &RoutePolicy, available: &[LinkType]) -> LinkSelection {
    if policy.require_secure_device() && !available.contains(&LinkType::SecureDevice) {
        return LinkSelection {
            link: None,
            reason: SelectionReason::SecureDeviceUnavailable,
        };
    }

    policy
        .link_preference()
        .iter()
        .enumerate()
        .find(|&(_, link)| available.contains(link))
        .map(|(rank, link)| LinkSelection {
            link: Some(*link),
            reason: SelectionReason::Preferred { rank },
        })
        .unwrap_or(LinkSelection {
            link: None,
            reason: SelectionReason::NoPreferredLink,
        })
}

// ── Per-link statistics ────────────────────────────────────────────────

/// Dispatch counts for each link.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LinkStats {
    pub direct_cell: Tally,
    pub secure_device: Tally,
    pub satellite: Tally,
}

impl LinkStats {
    pub fn get(&self, link: LinkType) -> &Tally {
        match link {
            LinkType::DirectCell => &self.direct_cell,
            LinkType::SecureDevice => &self.secure_device,
            LinkType::Satellite => &self.satellite,
        }
    }
}

// ── Router ─────────────────────────────────────────────────────────────

pub struct LinkRouter {
    policy: Arc<RoutePolicy>,
    registry: Arc<MembershipRegistry>,
    channels: ChannelSet,
    dispatch_timeout: Option<Duration>,
    stats: LinkStats,
}

impl LinkRouter {
    pub fn new(policy: RoutePolicy, registry: Arc<MembershipRegistry>, channels: ChannelSet) -> Self {
        Self {
            policy: Arc::new(policy),
            registry,
            channels,
            dispatch_timeout: None,
            stats: LinkStats::default(),
        }
    }

    /// Bound each channel hand-off. A send exceeding it is reported as a
    /// transport failure; the channel future is dropped.
    pub fn with_dispatch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    /// Replace the policy, returning the previous one.
    pub fn swap_policy(&mut self, policy: RoutePolicy) -> Arc<RoutePolicy> {
        std::mem::replace(&mut self.policy, Arc::new(policy))
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn link_stats(&self, link: LinkType) -> &Tally {
        self.stats.get(link)
    }

    /// Choose a link from `available`, or `None` if policy allows none.
    pub fn select_link(&self, available: &[LinkType]) -> Option<LinkType> {
        self.explain_selection(available).link
    }

    /// Like [`select_link`](Self::select_link) but also reports why.
    pub fn explain_selection(&self, available: &[LinkType]) -> LinkSelection {
        select(&self.policy, available)
    }

    /// Send `data` to `destination` over the best available link.
    ///
    /// - `Err(Unauthorized)` if `destination` is not a member.
    /// - `Err(PolicyViolation)` if the policy does not allow it.
    /// - `Ok(false)` if no link is viable right now.
    /// - `Ok(true)` once the selected channel accepted the data.
    /// - `Err(Transport)` if that channel failed.
    pub async fn send(
        &self,
        destination: &MemberId,
        data: &[u8],
        available: &[LinkType],
    ) -> Result<bool, SecureLinkError> {
        if !self.registry.is_authorized(destination) {
            return Err(SecureLinkError::Unauthorized {
                member: destination.clone(),
            });
        }
        if !self.policy.allows(destination) {
            return Err(SecureLinkError::PolicyViolation {
                destination: destination.clone(),
            });
        }

        let selection = self.explain_selection(available);
        let Some(link) = selection.link else {
            debug!(
                destination = %destination,
                reason = ?selection.reason,
                "no viable link"
            );
            return Ok(false);
        };

        self.dispatch(link, destination, data).await?;
        Ok(true)
    }

    /// Encode a signed message and send it to its recipient.
    pub async fn send_message(
        &self,
        message: &SecureMessage,
        available: &[LinkType],
    ) -> Result<bool, SecureLinkError> {
        let data = message.to_bytes()?;
        self.send(&message.recipient_id, &data, available).await
    }

    async fn dispatch(
        &self,
        link: LinkType,
        destination: &MemberId,
        data: &[u8],
    ) -> Result<(), SecureLinkError> {
        let tally = self.stats.get(link);
        tally.begin();

        let channel = self.channels.channel(link);
        let result = match self.dispatch_timeout {
            Some(limit) => match tokio::time::timeout(limit, channel.send(destination, data)).await
            {
                Ok(inner) => inner.map_err(|e| e.reason),
                Err(_) => Err(format!("timed out after {limit:?}")),
            },
            None => channel.send(destination, data).await.map_err(|e| e.reason),
        };

        tally.finish(result.is_ok());
        match result {
            Ok(()) => {
                debug!(link = %link, destination = %destination, bytes = data.len(), "dispatched");
                Ok(())
            }
            Err(reason) => {
                warn!(link = %link, destination = %destination, %reason, "dispatch failed");
                Err(SecureLinkError::Transport { link, reason })
            }
        }
    }
}

impl std::fmt::Debug for LinkRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkRouter")
            .field("policy", &self.policy)
            .field("dispatch_timeout", &self.dispatch_timeout)
            .finish_non_exhaustive()
    }
}
