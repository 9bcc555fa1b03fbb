//! Membership registry: the closed set of identities allowed to send or
//! receive.
//!
//! Interior locking lets one registry be shared (`Arc`) between signers,
//! verifiers and routers while an administrator adds or removes members.
//! Multi-party checks take a single read lock, so a verification sees one
//! consistent membership snapshot for sender and recipient together.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::types::MemberId;

#[derive(Debug, Default)]
pub struct MembershipRegistry {
    members: RwLock<HashSet<MemberId>>,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with `members`.
    pub fn with_members<I, M>(members: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<MemberId>,
    {
        Self {
            members: RwLock::new(members.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether `id` is currently a member. Unknown ids are simply `false`.
    pub fn is_authorized(&self, id: impl AsRef<str>) -> bool {
        self.read().contains(id.as_ref())
    }

    /// Add a member. Returns `true` if it was not already present.
    pub fn add_member(&self, id: impl Into<MemberId>) -> bool {
        let id = id.into();
        debug!(member = %id, "adding member");
        self.write().insert(id)
    }

    /// Remove a member. Removing a non-member is a no-op returning `false`.
    pub fn remove_member(&self, id: impl AsRef<str>) -> bool {
        let removed = self.write().remove(id.as_ref());
        if removed {
            debug!(member = id.as_ref(), "removed member");
        }
        removed
    }

    /// First id in `ids` that is not a member, checked under one lock.
    pub fn first_unauthorized<'a>(&self, ids: &[&'a MemberId]) -> Option<&'a MemberId> {
        let members = self.read();
        ids.iter().copied().find(|id| !members.contains(*id))
    }

    /// Whether every id in `ids` is a member, checked under one lock.
    pub fn all_authorized(&self, ids: &[&MemberId]) -> bool {
        self.first_unauthorized(ids).is_none()
    }

    /// Sorted copy of the current membership.
    pub fn members(&self) -> Vec<MemberId> {
        let mut out: Vec<MemberId> = self.read().iter().cloned().collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave a HashSet half-updated,
    // so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashSet<MemberId>> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashSet<MemberId>> {
        self.members.write().unwrap_or_else(PoisonError::into_inner)
    }
}
