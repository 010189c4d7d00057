//! Claim lifecycle: creation, reinforcement, access edits, damage, decay,
//! and removal.
//!
//! Every mutation is write-through: the store is updated first (with
//! retry), and the index only after the store succeeded. A failed store
//! write leaves the index untouched. Mutations lock the claim's region
//! stripes for the whole store round-trip, so overlap checks and
//! read-modify-write cycles on the same region are serialized.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use citadel_access::{AccessController, entry_for_decision};
use citadel_db::{ClaimStore, RetryPolicy, StoreError, with_retry};
use citadel_index::{RegionLocks, SharedClaimIndex};
use citadel_types::{
    AccessRecord, AccessSubject, Action, AuditEntry, BlockPos, Bounds, ChunkPos, Claim, ClaimId,
    Decision, DenyReason, EvictionCause, GroupId, PermissionSet, PlayerId, Reinforcement,
    ReinforcementType,
};
use serde::{Deserialize, Serialize};

use crate::config::{CitadelConfig, ClaimsConfig};
use crate::decay::{effective_damage, has_decayed, is_mature};
use crate::error::ServiceError;

/// A request to create a claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClaim {
    /// Group that will own the claim.
    pub group_id: GroupId,
    /// Player placing the reinforcement; must belong to `group_id`.
    pub creator: PlayerId,
    /// The region to protect.
    pub bounds: Bounds,
    /// Reinforcement material.
    pub reinforcement_type: u16,
}

/// Result of damaging a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DamageOutcome {
    /// The claim survived with this much health.
    Damaged {
        /// Health left after the hit.
        remaining: u32,
    },
    /// Health reached zero and the claim was removed.
    Destroyed,
    /// The claim no longer exists.
    Missing,
}

/// Owns the claim lifecycle on top of the index, the store, and the
/// access controller.
pub struct ClaimService {
    index: SharedClaimIndex,
    locks: RegionLocks,
    store: Arc<dyn ClaimStore>,
    access: AccessController,
    claims: ClaimsConfig,
    reinforcement_types: Vec<ReinforcementType>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ClaimService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimService")
            .field("claims", &self.index.len())
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

impl ClaimService {
    /// Create a service. `access` must read the same `index`.
    pub fn new(
        index: SharedClaimIndex,
        store: Arc<dyn ClaimStore>,
        access: AccessController,
        config: &CitadelConfig,
    ) -> Self {
        Self {
            index,
            locks: RegionLocks::default(),
            store,
            access,
            claims: config.claims.clone(),
            reinforcement_types: config.reinforcement_types.clone(),
            retry: config.persistence.retry_policy(),
        }
    }

    /// The shared claim index.
    pub const fn index(&self) -> &SharedClaimIndex {
        &self.index
    }

    /// The access controller used for permission checks.
    pub const fn access(&self) -> &AccessController {
        &self.access
    }

    /// The configured reinforcement types.
    pub fn reinforcement_types(&self) -> &[ReinforcementType] {
        &self.reinforcement_types
    }

    // -------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------

    /// The claim with this ID.
    pub fn get(&self, id: ClaimId) -> Result<Claim, ServiceError> {
        self.index.get(&id).ok_or(ServiceError::ClaimNotFound(id))
    }

    /// The claim containing `pos`, if any.
    pub fn lookup(&self, pos: &BlockPos) -> Option<Claim> {
        self.index.claim_at(pos)
    }

    /// Every claim intersecting `bounds`, ordered by ID.
    pub fn region(&self, bounds: &Bounds) -> Vec<Claim> {
        self.index.read(|idx| {
            idx.region_query(bounds)
                .iter()
                .filter_map(|id| idx.get(id).cloned())
                .collect()
        })
    }

    /// Recent audit entries for a claim, newest first.
    pub async fn audit_for_claim(
        &self,
        id: ClaimId,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, ServiceError> {
        let entries = with_retry(&self.retry, "audit_for_claim", || {
            self.store.audit_for_claim(id, limit)
        })
        .await?;
        Ok(entries)
    }

    // -------------------------------------------------------------------
    // Startup
    // -------------------------------------------------------------------

    /// Load every stored claim into the index. Returns how many were
    /// indexed; claims the index rejects are logged and skipped.
    pub async fn warm(&self) -> Result<usize, ServiceError> {
        let claims = with_retry(&self.retry, "load_all", || self.store.load_all()).await?;
        let total = claims.len();
        let indexed = self.index_loaded(claims);
        tracing::info!(indexed, total, "Claim index warmed");
        Ok(indexed)
    }

    /// Load the claims touching one chunk, skipping any already indexed.
    /// Returns how many were added.
    pub async fn load_chunk(&self, chunk: ChunkPos) -> Result<usize, ServiceError> {
        let claims =
            with_retry(&self.retry, "load_chunk", || self.store.load_chunk(chunk)).await?;
        let fresh: Vec<Claim> = self.index.read(|idx| {
            claims
                .into_iter()
                .filter(|c| !idx.contains(&c.id))
                .collect()
        });
        Ok(self.index_loaded(fresh))
    }

    /// Every chunk that holds stored claim data, sorted.
    pub async fn populated_chunks(&self) -> Result<Vec<ChunkPos>, ServiceError> {
        let chunks =
            with_retry(&self.retry, "populated_chunks", || self.store.populated_chunks()).await?;
        Ok(chunks)
    }

    fn index_loaded(&self, claims: Vec<Claim>) -> usize {
        self.index.write(|idx| {
            let mut indexed: usize = 0;
            for claim in claims {
                let id = claim.id;
                match idx.insert(claim) {
                    Ok(()) => indexed = indexed.saturating_add(1),
                    Err(err) => {
                        tracing::warn!(claim = %id, error = %err, "Skipping stored claim");
                    }
                }
            }
            indexed
        })
    }

    // -------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------

    /// Create and reinforce a new claim.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Validation`] for bad geometry
    /// - [`ServiceError::UnknownReinforcement`] for an unconfigured type
    /// - [`ServiceError::Denied`] if the creator is not in the group
    /// - [`ServiceError::Registry`] if membership cannot be resolved
    /// - [`ServiceError::Overlap`] if the region is already claimed
    /// - [`ServiceError::Store`] if persisting fails
    pub async fn create_claim(&self, request: NewClaim) -> Result<Claim, ServiceError> {
        self.validate_bounds(&request.bounds)?;
        let kind = self.reinforcement(request.reinforcement_type)?.clone();

        let member = self
            .access
            .registry()
            .is_member(request.group_id, request.creator)
            .await?;
        if !member {
            return Err(ServiceError::Denied(DenyReason::NotAuthorized));
        }

        let _guard = self.locks.lock(&request.bounds).await;
        if let Some(existing) = self.index.region_query(&request.bounds).first() {
            return Err(ServiceError::Overlap(*existing));
        }

        let now = Utc::now();
        let claim = Claim {
            id: ClaimId::new(),
            group_id: request.group_id,
            bounds: request.bounds,
            created_at: now,
            refreshed_at: now,
            reinforcement: Reinforcement {
                type_id: kind.id,
                health: kind.health,
                insecure: false,
            },
            access: vec![AccessRecord {
                subject: AccessSubject::Group(request.group_id),
                permissions: PermissionSet::ALL,
            }],
        };

        self.insert_new(&claim).await?;

        if let Err(err) = self.index.write(|idx| idx.insert(claim.clone())) {
            tracing::error!(
                claim = %claim.id,
                error = %err,
                "Indexing failed after insert, rolling back"
            );
            if let Err(undo) =
                with_retry(&self.retry, "delete_claim", || self.store.delete_claim(claim.id)).await
            {
                tracing::error!(claim = %claim.id, error = %undo, "Rollback failed");
            }
            return Err(err.into());
        }

        tracing::info!(
            claim = %claim.id,
            group = %claim.group_id,
            world = %claim.bounds.world,
            reinforcement = %kind.name,
            "Claim created"
        );
        Ok(claim)
    }

    /// Re-reinforce a claim: full health of `type_id`, refreshed decay and
    /// maturation clocks. The insecure flag is kept. Requires `manage`.
    pub async fn reinforce(
        &self,
        id: ClaimId,
        actor: PlayerId,
        type_id: u16,
    ) -> Result<Claim, ServiceError> {
        let kind = self.reinforcement(type_id)?.clone();
        let claim = self
            .modify(id, Some((actor, Action::Reinforce)), move |claim| {
                claim.reinforcement = Reinforcement {
                    type_id: kind.id,
                    health: kind.health,
                    insecure: claim.reinforcement.insecure,
                };
                claim.refreshed_at = Utc::now();
                Ok(true)
            })
            .await?;
        tracing::info!(claim = %id, actor = %actor, type_id, "Claim reinforced");
        Ok(claim)
    }

    /// Set the permission flags for `subject`. Requires `manage`. The
    /// owning group's record is fixed.
    pub async fn set_access(
        &self,
        id: ClaimId,
        actor: PlayerId,
        subject: AccessSubject,
        permissions: PermissionSet,
    ) -> Result<Claim, ServiceError> {
        self.modify(id, Some((actor, Action::ManageAccess)), move |claim| {
            reject_owner_subject(claim, subject)?;
            claim.upsert_record(AccessRecord {
                subject,
                permissions,
            });
            Ok(true)
        })
        .await
    }

    /// Remove `subject`'s record. Requires `manage`. Revoking a subject
    /// with no record is a no-op; the owning group cannot be revoked.
    pub async fn revoke_access(
        &self,
        id: ClaimId,
        actor: PlayerId,
        subject: AccessSubject,
    ) -> Result<Claim, ServiceError> {
        self.modify(id, Some((actor, Action::ManageAccess)), move |claim| {
            reject_owner_subject(claim, subject)?;
            Ok(claim.remove_record(&subject))
        })
        .await
    }

    /// Mark the claim's containers as reachable (or not) by host
    /// automation. Requires `manage`. Setting the current value writes
    /// nothing.
    pub async fn set_insecure(
        &self,
        id: ClaimId,
        actor: PlayerId,
        insecure: bool,
    ) -> Result<Claim, ServiceError> {
        let claim = self
            .modify(id, Some((actor, Action::ManageAccess)), move |claim| {
                let changed = claim.reinforcement.insecure != insecure;
                claim.reinforcement.insecure = insecure;
                Ok(changed)
            })
            .await?;
        tracing::info!(claim = %id, actor = %actor, insecure, "Claim security toggled");
        Ok(claim)
    }

    /// Remove a claim on request. Requires `manage`.
    pub async fn remove_claim(&self, id: ClaimId, actor: PlayerId) -> Result<(), ServiceError> {
        let bounds = self.get(id)?.bounds;
        let _guard = self.locks.lock(&bounds).await;
        let claim = self.get(id)?;
        self.authorize(&claim, actor, Action::RemoveClaim).await?;
        self.evict_locked(&claim, EvictionCause::Removed).await
    }

    /// Remove a claim without a permission check.
    pub async fn evict(&self, id: ClaimId, cause: EvictionCause) -> Result<(), ServiceError> {
        let bounds = self.get(id)?.bounds;
        let _guard = self.locks.lock(&bounds).await;
        let claim = self.get(id)?;
        self.evict_locked(&claim, cause).await
    }

    /// Apply `amount` damage to a claim, doubled (by the configured
    /// multiplier) while it is immature. At zero health the claim is
    /// destroyed.
    pub async fn damage_claim(
        &self,
        id: ClaimId,
        amount: u32,
    ) -> Result<DamageOutcome, ServiceError> {
        let Some(bounds) = self.index.get(&id).map(|c| c.bounds) else {
            return Ok(DamageOutcome::Missing);
        };
        let _guard = self.locks.lock(&bounds).await;
        let Some(mut claim) = self.index.get(&id) else {
            return Ok(DamageOutcome::Missing);
        };

        let now = Utc::now();
        let mature = self
            .reinforcement_types
            .iter()
            .find(|k| k.id == claim.reinforcement.type_id)
            .is_none_or(|kind| is_mature(&claim, kind, now));
        let damage = effective_damage(amount, mature, self.claims.immature_damage_multiplier);
        let remaining = claim.reinforcement.health.saturating_sub(damage);

        if remaining == 0 {
            self.evict_locked(&claim, EvictionCause::Destroyed).await?;
            return Ok(DamageOutcome::Destroyed);
        }

        claim.reinforcement.health = remaining;
        self.persist_update(&claim).await?;
        tracing::debug!(claim = %id, damage, remaining, mature, "Claim damaged");
        Ok(DamageOutcome::Damaged { remaining })
    }

    /// Evict every claim whose decay deadline passed before `now`.
    /// Returns the evicted IDs. Failures are logged and skipped so one bad
    /// claim cannot stall the sweep.
    pub async fn sweep_decay(&self, now: DateTime<Utc>) -> Vec<ClaimId> {
        let Some(ttl) = self.claims.decay_duration() else {
            return Vec::new();
        };
        let candidates = self.index.read(|idx| idx.expired(now, ttl));
        let mut evicted = Vec::with_capacity(candidates.len());

        for id in candidates {
            match self.evict_if_decayed(id, ttl, now).await {
                Ok(true) => evicted.push(id),
                Ok(false) => {}
                Err(err) => tracing::warn!(claim = %id, error = %err, "Decay eviction failed"),
            }
        }

        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "Decayed claims evicted");
        }
        evicted
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    fn reinforcement(&self, type_id: u16) -> Result<&ReinforcementType, ServiceError> {
        self.reinforcement_types
            .iter()
            .find(|k| k.id == type_id)
            .ok_or(ServiceError::UnknownReinforcement(type_id))
    }

    fn validate_bounds(&self, bounds: &Bounds) -> Result<(), ServiceError> {
        if !bounds.is_normalized() {
            return Err(ServiceError::Validation(String::from(
                "bounds min corner exceeds max corner",
            )));
        }
        let limit = self.claims.max_extent();
        if bounds.extent_x() > limit || bounds.extent_z() > limit {
            return Err(ServiceError::Validation(format!(
                "claim spans {}x{} blocks, limit is {limit}",
                bounds.extent_x(),
                bounds.extent_z()
            )));
        }
        if bounds.min_y < self.claims.world_min_y || bounds.max_y > self.claims.world_max_y {
            return Err(ServiceError::Validation(format!(
                "y range {}..={} leaves the world ({}..={})",
                bounds.min_y, bounds.max_y, self.claims.world_min_y, self.claims.world_max_y
            )));
        }
        Ok(())
    }

    async fn authorize(
        &self,
        claim: &Claim,
        actor: PlayerId,
        action: Action,
    ) -> Result<(), ServiceError> {
        let decision = self.access.decide_on_claim(claim, actor, action).await;
        if let Some(sink) = self.access.audit_sink() {
            sink.record(entry_for_decision(
                actor,
                action,
                Some(claim.id),
                claim.bounds.min_corner(),
                &decision,
            ));
        }
        match decision {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(ServiceError::Denied(reason)),
        }
    }

    /// Locked read-modify-write. `edit` returns whether it changed the
    /// claim; unchanged claims are not written back.
    async fn modify<F>(
        &self,
        id: ClaimId,
        check: Option<(PlayerId, Action)>,
        edit: F,
    ) -> Result<Claim, ServiceError>
    where
        F: FnOnce(&mut Claim) -> Result<bool, ServiceError> + Send,
    {
        let bounds = self.get(id)?.bounds;
        let _guard = self.locks.lock(&bounds).await;
        let mut claim = self.get(id)?;

        if let Some((actor, action)) = check {
            self.authorize(&claim, actor, action).await?;
        }
        if !edit(&mut claim)? {
            return Ok(claim);
        }
        self.persist_update(&claim).await?;
        Ok(claim)
    }

    /// Insert a freshly minted claim. On a retry, finding the claim's own ID
    /// already stored means an earlier attempt committed; that is success.
    async fn insert_new(&self, claim: &Claim) -> Result<(), ServiceError> {
        let attempts = AtomicU32::new(0);
        let attempts = &attempts;
        let store = &self.store;
        with_retry(&self.retry, "insert_claim", || async move {
            let retried = attempts.fetch_add(1, Ordering::Relaxed) > 0;
            match store.insert_claim(claim).await {
                Err(StoreError::Duplicate(id)) if retried && id == claim.id => {
                    tracing::warn!(claim = %id, "Insert committed by an earlier attempt");
                    Ok(())
                }
                other => other,
            }
        })
        .await?;
        Ok(())
    }

    async fn persist_update(&self, claim: &Claim) -> Result<(), ServiceError> {
        with_retry(&self.retry, "update_claim", || self.store.update_claim(claim)).await?;
        self.index.write(|idx| idx.replace(claim.clone()))?;
        Ok(())
    }

    async fn evict_locked(&self, claim: &Claim, cause: EvictionCause) -> Result<(), ServiceError> {
        let existed =
            with_retry(&self.retry, "delete_claim", || self.store.delete_claim(claim.id)).await?;
        if !existed {
            tracing::warn!(claim = %claim.id, "Evicted claim was already gone from the store");
        }
        self.index.write(|idx| idx.remove(&claim.id))?;
        tracing::info!(
            claim = %claim.id,
            group = %claim.group_id,
            cause = cause.as_str(),
            "Claim evicted"
        );
        Ok(())
    }

    async fn evict_if_decayed(
        &self,
        id: ClaimId,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, ServiceError> {
        let bounds = self.get(id)?.bounds;
        let _guard = self.locks.lock(&bounds).await;
        let claim = self.get(id)?;
        if !has_decayed(claim.refreshed_at, ttl, now) {
            return Ok(false);
        }
        self.evict_locked(&claim, EvictionCause::Decayed).await?;
        Ok(true)
    }
}

fn reject_owner_subject(claim: &Claim, subject: AccessSubject) -> Result<(), ServiceError> {
    if subject == AccessSubject::Group(claim.group_id) {
        return Err(ServiceError::Validation(String::from(
            "the owning group's access record is fixed",
        )));
    }
    Ok(())
}
