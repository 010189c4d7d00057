//! In-memory [`ClaimStore`] for tests and database-less runs.
//!
//! Failures can be injected to exercise retry and write-through paths:
//! [`MemoryClaimStore::fail_next`] makes the next `n` calls fail with a
//! transient or permanent error.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use citadel_types::{AuditEntry, ChunkPos, Claim, ClaimId};

use crate::error::StoreError;
use crate::store::ClaimStore;

#[derive(Debug, Default)]
struct Tables {
    claims: BTreeMap<ClaimId, Claim>,
    audit: Vec<AuditEntry>,
}

/// A [`ClaimStore`] held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryClaimStore {
    tables: Mutex<Tables>,
    failures_left: AtomicU32,
    failures_transient: AtomicBool,
    calls: AtomicU32,
}

impl MemoryClaimStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail. Transient failures are
    /// [`StoreError::Unavailable`]; permanent ones are [`StoreError::Corrupt`].
    pub fn fail_next(&self, count: u32, transient: bool) {
        self.failures_transient.store(transient, Ordering::SeqCst);
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Total calls made against the store, failed ones included.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of stored claims.
    pub fn claim_count(&self) -> usize {
        self.tables().claims.len()
    }

    /// A copy of a stored claim.
    pub fn stored(&self, id: ClaimId) -> Option<Claim> {
        self.tables().claims.get(&id).cloned()
    }

    /// Number of stored audit entries.
    pub fn audit_count(&self) -> usize {
        self.tables().audit.len()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let consumed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !consumed {
            return Ok(());
        }
        if self.failures_transient.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(String::from("injected failure")))
        } else {
            Err(StoreError::Corrupt(String::from("injected failure")))
        }
    }
}

#[async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn insert_claim(&self, claim: &Claim) -> Result<(), StoreError> {
        self.gate()?;
        let mut tables = self.tables();
        if tables.claims.contains_key(&claim.id) {
            return Err(StoreError::Duplicate(claim.id));
        }
        tables.claims.insert(claim.id, claim.clone());
        Ok(())
    }

    async fn update_claim(&self, claim: &Claim) -> Result<(), StoreError> {
        self.gate()?;
        let mut tables = self.tables();
        match tables.claims.get_mut(&claim.id) {
            Some(stored) => {
                stored.clone_from(claim);
                Ok(())
            }
            None => Err(StoreError::NotFound(claim.id)),
        }
    }

    async fn delete_claim(&self, id: ClaimId) -> Result<bool, StoreError> {
        self.gate()?;
        Ok(self.tables().claims.remove(&id).is_some())
    }

    async fn load_all(&self) -> Result<Vec<Claim>, StoreError> {
        self.gate()?;
        Ok(self.tables().claims.values().cloned().collect())
    }

    async fn load_chunk(&self, chunk: ChunkPos) -> Result<Vec<Claim>, StoreError> {
        self.gate()?;
        Ok(self
            .tables()
            .claims
            .values()
            .filter(|c| c.bounds.touches_chunk(&chunk))
            .cloned()
            .collect())
    }

    async fn populated_chunks(&self) -> Result<Vec<ChunkPos>, StoreError> {
        self.gate()?;
        let chunks: BTreeSet<(u16, i32, i32)> = self
            .tables()
            .claims
            .values()
            .flat_map(|c| c.bounds.chunks())
            .map(|c| (c.world.0, c.x, c.z))
            .collect();
        Ok(chunks
            .into_iter()
            .map(|(world, x, z)| ChunkPos::new(citadel_types::WorldId(world), x, z))
            .collect())
    }

    async fn append_audit(&self, entries: &[AuditEntry]) -> Result<(), StoreError> {
        self.gate()?;
        self.tables().audit.extend_from_slice(entries);
        Ok(())
    }

    async fn audit_for_claim(
        &self,
        id: ClaimId,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        self.gate()?;
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let mut entries: Vec<AuditEntry> = self
            .tables()
            .audit
            .iter()
            .filter(|e| e.claim_id == Some(id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        entries.truncate(limit);
        Ok(entries)
    }
}
