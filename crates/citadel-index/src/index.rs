//! Arena-backed spatial index of claims.
//!
//! [`ClaimIndex`] owns every active [`Claim`] in an arena of slots. Two
//! side tables point into the arena:
//!
//! - `by_id`: `ClaimId -> slot` for direct access
//! - `grid`: `ChunkPos -> Vec<slot>` listing the claims touching each chunk
//!   column
//!
//! A point lookup hashes one chunk and scans the handful of claims touching
//! it, so lookups stay sub-millisecond regardless of how many claims exist
//! elsewhere. Freed slots are recycled through a free list.
//!
//! The index enforces the no-overlap invariant on insert: no block is ever
//! contained by two indexed claims.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use citadel_types::{BlockPos, Bounds, ChunkPos, Claim, ClaimId, to_chunk_coord};

use crate::error::IndexError;

/// Spatial index mapping world coordinates to claims.
#[derive(Debug, Default)]
pub struct ClaimIndex {
    /// Claim storage. `None` marks a free slot.
    slots: Vec<Option<Claim>>,
    /// Indices of free slots available for reuse.
    free: Vec<usize>,
    /// Claim ID to slot.
    by_id: HashMap<ClaimId, usize>,
    /// Chunk column to the slots of every claim touching it.
    grid: HashMap<ChunkPos, Vec<usize>>,
}

impl ClaimIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed claims.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the index holds no claims.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Number of chunk columns holding at least one claim.
    pub fn chunk_count(&self) -> usize {
        self.grid.len()
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    /// The claim containing `pos`, if any.
    pub fn lookup(&self, pos: &BlockPos) -> Option<ClaimId> {
        self.claim_at(pos).map(|c| c.id)
    }

    /// The full claim containing `pos`, if any.
    pub fn claim_at(&self, pos: &BlockPos) -> Option<&Claim> {
        self.grid
            .get(&pos.chunk())?
            .iter()
            .filter_map(|&slot| self.slot(slot))
            .find(|c| c.bounds.contains(pos))
    }

    /// The claim with the given ID, if indexed.
    pub fn get(&self, id: &ClaimId) -> Option<&Claim> {
        self.by_id.get(id).and_then(|&slot| self.slot(slot))
    }

    /// Whether a claim with this ID is indexed.
    pub fn contains(&self, id: &ClaimId) -> bool {
        self.by_id.contains_key(id)
    }

    /// IDs of every claim intersecting `bounds`.
    ///
    /// Walks the chunks covered by `bounds`, or the populated grid when that
    /// is smaller (a world-sized query should not enumerate empty chunks).
    pub fn region_query(&self, bounds: &Bounds) -> BTreeSet<ClaimId> {
        let mut hits = BTreeSet::new();
        let populated = u64::try_from(self.grid.len()).unwrap_or(u64::MAX);
        if chunk_span(bounds) > populated {
            for (chunk, slots) in &self.grid {
                if bounds.touches_chunk(chunk) {
                    self.collect_intersecting(slots, bounds, &mut hits);
                }
            }
        } else {
            for chunk in bounds.chunks() {
                if let Some(slots) = self.grid.get(&chunk) {
                    self.collect_intersecting(slots, bounds, &mut hits);
                }
            }
        }
        hits
    }

    /// Every claim touching a chunk column.
    pub fn claims_in_chunk(&self, chunk: &ChunkPos) -> Vec<&Claim> {
        self.grid
            .get(chunk)
            .map(|slots| slots.iter().filter_map(|&s| self.slot(s)).collect())
            .unwrap_or_default()
    }

    /// Iterate over every indexed claim in arena order.
    pub fn iter(&self) -> impl Iterator<Item = &Claim> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// IDs of claims whose last refresh is older than `ttl` at `now`.
    ///
    /// Returned in ascending ID order (creation order for v7 IDs).
    pub fn expired(&self, now: DateTime<Utc>, ttl: Duration) -> Vec<ClaimId> {
        let mut ids: Vec<ClaimId> = self
            .iter()
            .filter(|c| {
                c.refreshed_at
                    .checked_add_signed(ttl)
                    .is_some_and(|deadline| deadline < now)
            })
            .map(|c| c.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    // -------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------

    /// Index a new claim.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidBounds`] for unnormalized bounds,
    /// [`IndexError::DuplicateClaim`] if the ID is taken, or
    /// [`IndexError::Overlap`] if any block is already claimed.
    pub fn insert(&mut self, claim: Claim) -> Result<(), IndexError> {
        if !claim.bounds.is_normalized() {
            return Err(IndexError::InvalidBounds(claim.id));
        }
        if self.by_id.contains_key(&claim.id) {
            return Err(IndexError::DuplicateClaim(claim.id));
        }
        if let Some(&existing) = self.region_query(&claim.bounds).first() {
            return Err(IndexError::Overlap {
                claim: claim.id,
                existing,
            });
        }

        let id = claim.id;
        let chunks: Vec<ChunkPos> = claim.bounds.chunks().collect();
        let slot = self.allocate(claim);
        for chunk in chunks {
            self.grid.entry(chunk).or_default().push(slot);
        }
        self.by_id.insert(id, slot);
        Ok(())
    }

    /// Replace an indexed claim with an updated copy of the same bounds.
    ///
    /// Returns the previous version.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ClaimNotFound`] if the claim is not indexed or
    /// [`IndexError::BoundsChanged`] if the bounds differ.
    pub fn replace(&mut self, claim: Claim) -> Result<Claim, IndexError> {
        let slot = *self
            .by_id
            .get(&claim.id)
            .ok_or(IndexError::ClaimNotFound(claim.id))?;
        let entry = self
            .slots
            .get_mut(slot)
            .and_then(Option::as_mut)
            .ok_or(IndexError::ClaimNotFound(claim.id))?;
        if entry.bounds != claim.bounds {
            return Err(IndexError::BoundsChanged(claim.id));
        }
        Ok(std::mem::replace(entry, claim))
    }

    /// Remove a claim, returning it with its access records.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::ClaimNotFound`] if the claim is not indexed.
    pub fn remove(&mut self, id: &ClaimId) -> Result<Claim, IndexError> {
        let slot = self
            .by_id
            .remove(id)
            .ok_or(IndexError::ClaimNotFound(*id))?;
        let claim = self
            .slots
            .get_mut(slot)
            .and_then(Option::take)
            .ok_or(IndexError::ClaimNotFound(*id))?;

        for chunk in claim.bounds.chunks() {
            if let Some(slots) = self.grid.get_mut(&chunk) {
                slots.retain(|&s| s != slot);
                if slots.is_empty() {
                    self.grid.remove(&chunk);
                }
            }
        }
        self.free.push(slot);
        Ok(claim)
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    fn slot(&self, slot: usize) -> Option<&Claim> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    fn allocate(&mut self, claim: Claim) -> usize {
        if let Some(slot) = self.free.pop() {
            if let Some(entry) = self.slots.get_mut(slot) {
                *entry = Some(claim);
                return slot;
            }
        }
        self.slots.push(Some(claim));
        self.slots.len().saturating_sub(1)
    }

    fn collect_intersecting(&self, slots: &[usize], bounds: &Bounds, hits: &mut BTreeSet<ClaimId>) {
        for claim in slots.iter().filter_map(|&s| self.slot(s)) {
            if claim.bounds.intersects(bounds) {
                hits.insert(claim.id);
            }
        }
    }
}

/// Number of chunk columns covered by `bounds`, saturating.
pub(crate) fn chunk_span(bounds: &Bounds) -> u64 {
    let dx = i64::from(to_chunk_coord(bounds.max_x))
        .saturating_sub(i64::from(to_chunk_coord(bounds.min_x)));
    let dz = i64::from(to_chunk_coord(bounds.max_z))
        .saturating_sub(i64::from(to_chunk_coord(bounds.min_z)));
    let wx = u64::try_from(dx).map_or(0, |d| d.saturating_add(1));
    let wz = u64::try_from(dz).map_or(0, |d| d.saturating_add(1));
    wx.saturating_mul(wz)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use citadel_types::{
        AccessRecord, AccessSubject, GroupId, PermissionSet, Reinforcement, WorldId,
    };

    use super::*;

    const W: WorldId = WorldId(0);

    fn make_claim(a: (i32, i32, i32), b: (i32, i32, i32)) -> Claim {
        let group = GroupId::new();
        Claim {
            id: ClaimId::new(),
            group_id: group,
            bounds: Bounds::new(W, a, b),
            created_at: Utc::now(),
            refreshed_at: Utc::now(),
            reinforcement: Reinforcement {
                type_id: 1,
                health: 25,
                insecure: false,
            },
            access: vec![AccessRecord {
                subject: AccessSubject::Group(group),
                permissions: PermissionSet::ALL,
            }],
        }
    }

    #[test]
    fn lookup_finds_containing_claim() {
        let mut index = ClaimIndex::new();
        let claim = make_claim((0, 0, 0), (10, 100, 10));
        let id = claim.id;
        index.insert(claim).unwrap();

        assert_eq!(index.lookup(&BlockPos::new(W, 5, 50, 5)), Some(id));
        assert_eq!(index.lookup(&BlockPos::new(W, 50, 50, 50)), None);
        assert_eq!(index.lookup(&BlockPos::new(WorldId(1), 5, 50, 5)), None);
    }

    #[test]
    fn lookup_spanning_negative_chunks() {
        let mut index = ClaimIndex::new();
        let claim = make_claim((-20, 0, -20), (20, 10, 20));
        let id = claim.id;
        index.insert(claim).unwrap();

        assert_eq!(index.lookup(&BlockPos::new(W, -20, 0, -20)), Some(id));
        assert_eq!(index.lookup(&BlockPos::new(W, 20, 10, 20)), Some(id));
        assert_eq!(index.lookup(&BlockPos::new(W, -21, 0, 0)), None);
        assert_eq!(index.chunk_count(), 16);
    }

    #[test]
    fn overlapping_insert_rejected() {
        let mut index = ClaimIndex::new();
        let first = make_claim((0, 0, 0), (10, 10, 10));
        let first_id = first.id;
        index.insert(first).unwrap();

        let second = make_claim((10, 10, 10), (12, 12, 12));
        let err = index.insert(second).unwrap_err();
        assert!(matches!(err, IndexError::Overlap { existing, .. } if existing == first_id));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn adjacent_claims_coexist() {
        let mut index = ClaimIndex::new();
        index.insert(make_claim((0, 0, 0), (10, 10, 10))).unwrap();
        index.insert(make_claim((11, 0, 0), (20, 10, 10))).unwrap();
        index.insert(make_claim((0, 11, 0), (10, 20, 10))).unwrap();
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut index = ClaimIndex::new();
        let claim = make_claim((0, 0, 0), (1, 1, 1));
        let mut moved = claim.clone();
        moved.bounds = Bounds::new(W, (100, 0, 100), (101, 1, 101));
        index.insert(claim).unwrap();
        assert!(matches!(
            index.insert(moved),
            Err(IndexError::DuplicateClaim(_))
        ));
    }

    #[test]
    fn unnormalized_bounds_rejected() {
        let mut index = ClaimIndex::new();
        let mut claim = make_claim((0, 0, 0), (1, 1, 1));
        claim.bounds.min_x = 5;
        assert!(matches!(
            index.insert(claim),
            Err(IndexError::InvalidBounds(_))
        ));
    }

    #[test]
    fn remove_clears_every_chunk() {
        let mut index = ClaimIndex::new();
        let claim = make_claim((0, 0, 0), (40, 5, 40));
        let id = claim.id;
        index.insert(claim).unwrap();
        assert!(index.chunk_count() > 1);

        let removed = index.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert_eq!(removed.access.len(), 1);
        assert!(index.is_empty());
        assert_eq!(index.chunk_count(), 0);
        for x in (0..=40).step_by(5) {
            assert_eq!(index.lookup(&BlockPos::new(W, x, 2, x)), None);
        }
        assert!(matches!(index.remove(&id), Err(IndexError::ClaimNotFound(_))));
    }

    #[test]
    fn freed_slot_is_reused() {
        let mut index = ClaimIndex::new();
        let a = make_claim((0, 0, 0), (1, 1, 1));
        let a_id = a.id;
        index.insert(a).unwrap();
        index.remove(&a_id).unwrap();

        let b = make_claim((0, 0, 0), (1, 1, 1));
        let b_id = b.id;
        index.insert(b).unwrap();
        assert_eq!(index.slots.len(), 1);
        assert_eq!(index.lookup(&BlockPos::new(W, 1, 1, 1)), Some(b_id));
    }

    #[test]
    fn region_query_collects_intersections() {
        let mut index = ClaimIndex::new();
        let a = make_claim((0, 0, 0), (10, 10, 10));
        let b = make_claim((30, 0, 30), (40, 10, 40));
        let c = make_claim((100, 0, 100), (110, 10, 110));
        let (a_id, b_id) = (a.id, b.id);
        index.insert(a).unwrap();
        index.insert(b).unwrap();
        index.insert(c).unwrap();

        let hits = index.region_query(&Bounds::new(W, (5, 5, 5), (35, 5, 35)));
        assert_eq!(hits, BTreeSet::from([a_id, b_id]));

        // Same chunk as `a`, but a different y band.
        let miss = index.region_query(&Bounds::new(W, (0, 50, 0), (10, 60, 10)));
        assert!(miss.is_empty());
    }

    #[test]
    fn world_sized_region_query_walks_grid() {
        let mut index = ClaimIndex::new();
        index.insert(make_claim((0, 0, 0), (1, 1, 1))).unwrap();
        index.insert(make_claim((-5000, 0, 9000), (-4999, 1, 9001))).unwrap();
        let everything = Bounds::new(
            W,
            (i32::MIN, i32::MIN, i32::MIN),
            (i32::MAX, i32::MAX, i32::MAX),
        );
        assert_eq!(index.region_query(&everything).len(), 2);
    }

    #[test]
    fn replace_keeps_bounds() {
        let mut index = ClaimIndex::new();
        let claim = make_claim((0, 0, 0), (3, 3, 3));
        index.insert(claim.clone()).unwrap();

        let mut damaged = claim.clone();
        damaged.reinforcement.health = 3;
        let previous = index.replace(damaged).unwrap();
        assert_eq!(previous.reinforcement.health, 25);
        assert_eq!(index.get(&claim.id).map(|c| c.reinforcement.health), Some(3));

        let mut moved = claim;
        moved.bounds = Bounds::new(W, (0, 0, 0), (4, 4, 4));
        assert!(matches!(index.replace(moved), Err(IndexError::BoundsChanged(_))));
    }

    #[test]
    fn expired_uses_refresh_time() {
        let mut index = ClaimIndex::new();
        let mut stale = make_claim((0, 0, 0), (1, 1, 1));
        stale.refreshed_at = Utc::now() - Duration::days(40);
        let stale_id = stale.id;
        index.insert(stale).unwrap();
        index.insert(make_claim((5, 0, 5), (6, 1, 6))).unwrap();

        assert_eq!(index.expired(Utc::now(), Duration::days(30)), vec![stale_id]);
    }

    #[test]
    fn claims_in_chunk_lists_touching_claims() {
        let mut index = ClaimIndex::new();
        index.insert(make_claim((0, 0, 0), (1, 1, 1))).unwrap();
        index.insert(make_claim((14, 0, 14), (17, 1, 17))).unwrap();
        assert_eq!(index.claims_in_chunk(&ChunkPos::new(W, 0, 0)).len(), 2);
        assert_eq!(index.claims_in_chunk(&ChunkPos::new(W, 1, 1)).len(), 1);
        assert!(index.claims_in_chunk(&ChunkPos::new(W, 5, 5)).is_empty());
    }
}
