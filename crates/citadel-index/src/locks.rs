//! Striped per-region write locks.
//!
//! Creating a claim is check-then-act: verify the region is free, persist,
//! then index. Two concurrent creations over overlapping regions must not
//! both pass the check. [`RegionLocks`] hashes each chunk column onto one of
//! a fixed number of async mutexes; a writer locks every stripe its bounds
//! touch, in ascending stripe order, and holds them across the store
//! round-trip. Writers on disjoint regions mostly hit different stripes and
//! proceed in parallel. Readers never touch these locks.

use std::collections::BTreeSet;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use citadel_types::{Bounds, ChunkPos};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::index::chunk_span;

/// Default number of lock stripes.
pub const DEFAULT_STRIPES: usize = 64;

/// A fixed set of async mutexes keyed by chunk column.
#[derive(Debug, Clone)]
pub struct RegionLocks {
    stripes: Arc<Vec<Arc<Mutex<()>>>>,
}

/// Held stripes for one region. Dropping it releases them.
#[derive(Debug)]
pub struct RegionGuard {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl RegionGuard {
    /// Number of stripes held.
    pub const fn stripe_count(&self) -> usize {
        self.guards.len()
    }
}

impl Default for RegionLocks {
    fn default() -> Self {
        Self::new(DEFAULT_STRIPES)
    }
}

impl RegionLocks {
    /// Create a lock set with `stripes` stripes (at least one).
    pub fn new(stripes: usize) -> Self {
        let count = stripes.max(1);
        Self {
            stripes: Arc::new((0..count).map(|_| Arc::new(Mutex::new(()))).collect()),
        }
    }

    /// Lock every stripe touched by `bounds`.
    ///
    /// Stripes are acquired in ascending order, so concurrent callers can
    /// never deadlock against each other.
    pub async fn lock(&self, bounds: &Bounds) -> RegionGuard {
        let wanted = self.stripes_for(bounds);
        let mut guards = Vec::with_capacity(wanted.len());
        for stripe in wanted {
            if let Some(mutex) = self.stripes.get(stripe) {
                guards.push(Arc::clone(mutex).lock_owned().await);
            }
        }
        RegionGuard { guards }
    }

    /// Stripe indices covering `bounds`, ascending and deduplicated.
    fn stripes_for(&self, bounds: &Bounds) -> BTreeSet<usize> {
        let count = self.stripes.len();
        let span = chunk_span(bounds);
        if span >= u64::try_from(count).unwrap_or(u64::MAX) {
            return (0..count).collect();
        }
        bounds
            .chunks()
            .map(|chunk| stripe_of(&chunk, count))
            .collect()
    }
}

fn stripe_of(chunk: &ChunkPos, count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    chunk.hash(&mut hasher);
    let hash = hasher.finish();
    let count_u64 = u64::try_from(count).unwrap_or(u64::MAX).max(1);
    usize::try_from(hash.checked_rem(count_u64).unwrap_or(0)).unwrap_or(0)
}
