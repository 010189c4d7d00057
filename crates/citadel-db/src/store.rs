//! The persistence capability the claim service writes through.

use async_trait::async_trait;
use citadel_types::{AuditEntry, ChunkPos, Claim, ClaimId};

use crate::error::StoreError;

/// Durable storage for claims, their access records, and audit entries.
///
/// A claim and its access records are always written together; an update
/// replaces the stored record set wholesale.
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Store a new claim. Fails with [`StoreError::Duplicate`] if the ID is
    /// already present.
    async fn insert_claim(&self, claim: &Claim) -> Result<(), StoreError>;

    /// Overwrite a stored claim. Fails with [`StoreError::NotFound`] if it
    /// is not present.
    async fn update_claim(&self, claim: &Claim) -> Result<(), StoreError>;

    /// Delete a claim and its access records. Returns whether it existed.
    async fn delete_claim(&self, id: ClaimId) -> Result<bool, StoreError>;

    /// Every stored claim.
    async fn load_all(&self) -> Result<Vec<Claim>, StoreError>;

    /// Claims whose bounds touch `chunk`.
    async fn load_chunk(&self, chunk: ChunkPos) -> Result<Vec<Claim>, StoreError>;

    /// Every chunk touched by at least one stored claim, sorted.
    async fn populated_chunks(&self) -> Result<Vec<ChunkPos>, StoreError>;

    /// Append a batch of audit entries.
    async fn append_audit(&self, entries: &[AuditEntry]) -> Result<(), StoreError>;

    /// The most recent audit entries for a claim, newest first.
    async fn audit_for_claim(&self, id: ClaimId, limit: u32)
    -> Result<Vec<AuditEntry>, StoreError>;
}
