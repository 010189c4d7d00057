//! Thread-safe handle onto the claim index.
//!
//! Access checks run on host threads and runtime workers at the same time,
//! so the index sits behind a [`std::sync::RwLock`]: many concurrent readers,
//! one short exclusive writer. The lock is never held across an `.await`.
//! Accessors clone claims out so callers never hold the guard themselves.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use citadel_types::{BlockPos, Bounds, Claim, ClaimId};

use crate::index::ClaimIndex;

/// Cloneable, shareable handle onto a [`ClaimIndex`].
#[derive(Debug, Clone, Default)]
pub struct SharedClaimIndex {
    inner: Arc<RwLock<ClaimIndex>>,
}

impl SharedClaimIndex {
    /// Wrap an index for shared use.
    pub fn new(index: ClaimIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
        }
    }

    /// Run `f` with shared read access.
    pub fn read<R>(&self, f: impl FnOnce(&ClaimIndex) -> R) -> R {
        f(&self.read_guard())
    }

    /// Run `f` with exclusive write access.
    pub fn write<R>(&self, f: impl FnOnce(&mut ClaimIndex) -> R) -> R {
        f(&mut self.write_guard())
    }

    /// The claim ID containing `pos`, if any.
    pub fn lookup(&self, pos: &BlockPos) -> Option<ClaimId> {
        self.read(|idx| idx.lookup(pos))
    }

    /// A copy of the claim containing `pos`, if any.
    pub fn claim_at(&self, pos: &BlockPos) -> Option<Claim> {
        self.read(|idx| idx.claim_at(pos).cloned())
    }

    /// A copy of the claim with this ID, if indexed.
    pub fn get(&self, id: &ClaimId) -> Option<Claim> {
        self.read(|idx| idx.get(id).cloned())
    }

    /// IDs of every claim intersecting `bounds`.
    pub fn region_query(&self, bounds: &Bounds) -> BTreeSet<ClaimId> {
        self.read(|idx| idx.region_query(bounds))
    }

    /// Number of indexed claims.
    pub fn len(&self) -> usize {
        self.read(ClaimIndex::len)
    }

    /// Whether the index holds no claims.
    pub fn is_empty(&self) -> bool {
        self.read(ClaimIndex::is_empty)
    }

    // A panic while holding the lock leaves the index structurally intact:
    // every mutation validates before it touches the arena.
    fn read_guard(&self) -> RwLockReadGuard<'_, ClaimIndex> {
        self.inner.read().unwrap_or_else(|poisoned| {
            tracing::warn!("claim index lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, ClaimIndex> {
        self.inner.write().unwrap_or_else(|poisoned| {
            tracing::warn!("claim index lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }
}
