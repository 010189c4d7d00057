//! Group membership lookups.
//!
//! Groups belong to the external group service (`NameLayer`). Citadel never
//! mutates them; it only asks who is in a group. [`GroupRegistry`] is that
//! capability. [`InMemoryGroupRegistry`] is a membership mirror that the
//! host keeps in sync by pushing group changes over the HTTP bridge.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use citadel_types::{GroupId, PlayerId};

use crate::error::RegistryError;

/// Resolves group membership for access decisions.
#[async_trait]
pub trait GroupRegistry: Send + Sync {
    /// Every member of `group`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::GroupNotFound`] for unknown groups and
    /// [`RegistryError::Unavailable`] when the service cannot answer.
    async fn members_of(&self, group: GroupId) -> Result<BTreeSet<PlayerId>, RegistryError>;

    /// Whether `player` belongs to `group`.
    ///
    /// # Errors
    ///
    /// Same as [`GroupRegistry::members_of`].
    async fn is_member(&self, group: GroupId, player: PlayerId) -> Result<bool, RegistryError> {
        Ok(self.members_of(group).await?.contains(&player))
    }
}

/// Membership mirror held in memory.
///
/// Marked unavailable until told otherwise when built with
/// [`InMemoryGroupRegistry::unsynced`], so that a freshly started engine
/// fails closed until the host completes its first sync.
#[derive(Debug)]
pub struct InMemoryGroupRegistry {
    groups: RwLock<HashMap<GroupId, BTreeSet<PlayerId>>>,
    available: AtomicBool,
}

impl Default for InMemoryGroupRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGroupRegistry {
    /// An empty, available registry.
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// An empty registry that reports itself unavailable until
    /// [`set_available`](Self::set_available) is called.
    pub fn unsynced() -> Self {
        let registry = Self::new();
        registry.set_available(false);
        registry
    }

    /// Mark the mirror as reachable or not.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    /// Whether the mirror currently answers queries.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Replace the full member list of a group, creating it if needed.
    pub fn set_members(&self, group: GroupId, members: impl IntoIterator<Item = PlayerId>) {
        let members: BTreeSet<PlayerId> = members.into_iter().collect();
        tracing::debug!(group = %group, members = members.len(), "group membership replaced");
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group, members);
    }

    /// Add one member to a group, creating it if needed.
    pub fn add_member(&self, group: GroupId, player: PlayerId) {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(group)
            .or_default()
            .insert(player);
    }

    /// Remove a group entirely. Returns whether it existed.
    pub fn remove_group(&self, group: GroupId) -> bool {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&group)
            .is_some()
    }

    /// Number of known groups.
    pub fn group_count(&self) -> usize {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl GroupRegistry for InMemoryGroupRegistry {
    async fn members_of(&self, group: GroupId) -> Result<BTreeSet<PlayerId>, RegistryError> {
        if !self.is_available() {
            return Err(RegistryError::Unavailable(String::from(
                "membership mirror not synced",
            )));
        }
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&group)
            .cloned()
            .ok_or(RegistryError::GroupNotFound(group))
    }

    async fn is_member(&self, group: GroupId, player: PlayerId) -> Result<bool, RegistryError> {
        if !self.is_available() {
            return Err(RegistryError::Unavailable(String::from(
                "membership mirror not synced",
            )));
        }
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&group)
            .map(|members| members.contains(&player))
            .ok_or(RegistryError::GroupNotFound(group))
    }
}
