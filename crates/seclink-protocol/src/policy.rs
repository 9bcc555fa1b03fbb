//! Route policy: which links to prefer and which destinations are reachable.
//!
//! Policies are immutable once built; a router swaps in a new one instead
//! of editing the old.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::SecureLinkError;
use crate::types::{LinkType, MemberId};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutePolicy {
    link_preference: Vec<LinkType>,
    #[serde(default)]
    require_secure_device: bool,
    allowed_endpoints: BTreeSet<MemberId>,
}

impl RoutePolicy {
    pub fn new<I, M>(link_preference: Vec<LinkType>, require_secure_device: bool, allowed: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MemberId>,
    {
        Self {
            link_preference,
            require_secure_device,
            allowed_endpoints: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn builder() -> RoutePolicyBuilder {
        RoutePolicyBuilder::default()
    }

    /// Links in descending order of preference.
    pub fn link_preference(&self) -> &[LinkType] {
        &self.link_preference
    }

    pub fn require_secure_device(&self) -> bool {
        self.require_secure_device
    }

    pub fn allowed_endpoints(&self) -> &BTreeSet<MemberId> {
        &self.allowed_endpoints
    }

    pub fn allows(&self, destination: &MemberId) -> bool {
        self.allowed_endpoints.contains(destination)
    }

    /// Load a policy from its JSON form:
    ///
    /// ```json
    /// {"link_preference": ["satellite", "direct_cell"],
    ///  "require_secure_device": false,
    ///  "allowed_endpoints": ["B"]}
    /// ```
    pub fn from_json(data: &str) -> Result<Self, SecureLinkError> {
        serde_json::from_str(data).map_err(|e| SecureLinkError::InvalidConfig(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, SecureLinkError> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }
}

/// Builder for [`RoutePolicy`].
#[derive(Debug, Default)]
pub struct RoutePolicyBuilder {
    policy: RoutePolicy,
}

impl RoutePolicyBuilder {
    /// Append a link to the preference list.
    pub fn prefer(mut self, link: LinkType) -> Self {
        self.policy.link_preference.push(link);
        self
    }

    pub fn require_secure_device(mut self, required: bool) -> Self {
        self.policy.require_secure_device = required;
        self
    }

    /// Allow routing to `destination`.
    pub fn allow(mut self, destination: impl Into<MemberId>) -> Self {
        self.policy.allowed_endpoints.insert(destination.into());
        self
    }

    pub fn build(self) -> RoutePolicy {
        self.policy
    }
}
