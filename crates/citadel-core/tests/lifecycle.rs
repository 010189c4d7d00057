//! Claim lifecycle tests against the in-memory store and registry.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::missing_panics_doc
)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use citadel_access::{
    AccessController, AccessPolicy, AuditSink, GroupRegistry, InMemoryGroupRegistry,
};
use citadel_core::{
    CitadelConfig, ClaimService, DamageOutcome, ErrorKind, NewClaim, ServiceError,
};
use citadel_db::{ClaimStore, MemoryClaimStore, StoreError};
use citadel_index::SharedClaimIndex;
use citadel_types::{
    AccessSubject, Action, AuditEntry, BlockPos, Bounds, ChunkPos, Claim, ClaimId, Decision,
    DenyReason, EvictionCause, GroupId, Permission, PermissionSet, PlayerId, ReinforcementType,
    WorldId,
};
use tokio::sync::mpsc;

const W: WorldId = WorldId(0);

struct Harness {
    service: Arc<ClaimService>,
    store: Arc<MemoryClaimStore>,
    registry: Arc<InMemoryGroupRegistry>,
    audit: mpsc::Receiver<AuditEntry>,
    owners: GroupId,
    alice: PlayerId,
    bob: PlayerId,
}

fn test_config() -> CitadelConfig {
    let mut config = CitadelConfig::default();
    config.persistence.initial_backoff_ms = 1;
    config.persistence.max_backoff_ms = 2;
    config.persistence.jitter_pct = 0;
    config.reinforcement_types = vec![
        ReinforcementType {
            id: 1,
            name: String::from("stone"),
            health: 25,
            maturation_secs: 0,
        },
        ReinforcementType {
            id: 2,
            name: String::from("iron"),
            health: 250,
            maturation_secs: 3600,
        },
    ];
    config
}

fn harness_with(config: &CitadelConfig, store: Arc<MemoryClaimStore>) -> Harness {
    let registry = Arc::new(InMemoryGroupRegistry::new());
    let owners = GroupId::new();
    let alice = PlayerId::new();
    let bob = PlayerId::new();
    registry.set_members(owners, [alice]);

    let index = SharedClaimIndex::default();
    let (sink, audit) = AuditSink::channel(256);
    let access = AccessController::new(
        index.clone(),
        Arc::clone(&registry) as Arc<dyn GroupRegistry>,
        AccessPolicy {
            default_policy: config.claims.default_policy,
            audit_unclaimed: config.audit.include_unclaimed,
        },
    )
    .with_audit(sink);
    let service = Arc::new(ClaimService::new(
        index,
        Arc::clone(&store) as Arc<dyn ClaimStore>,
        access,
        config,
    ));

    Harness {
        service,
        store,
        registry,
        audit,
        owners,
        alice,
        bob,
    }
}

fn harness() -> Harness {
    harness_with(&test_config(), Arc::new(MemoryClaimStore::new()))
}

fn request(h: &Harness, min: (i32, i32, i32), max: (i32, i32, i32), kind: u16) -> NewClaim {
    NewClaim {
        group_id: h.owners,
        creator: h.alice,
        bounds: Bounds::new(W, min, max),
        reinforcement_type: kind,
    }
}

#[tokio::test]
async fn created_claim_is_stored_and_indexed() {
    let h = harness();
    let claim = h
        .service
        .create_claim(request(&h, (0, 64, 0), (10, 70, 10), 1))
        .await
        .unwrap();

    assert_eq!(claim.reinforcement.health, 25);
    assert_eq!(
        claim.record_for(&AccessSubject::Group(h.owners)).map(|r| r.permissions),
        Some(PermissionSet::ALL)
    );
    assert_eq!(h.store.stored(claim.id), Some(claim.clone()));
    assert_eq!(
        h.service.lookup(&BlockPos::new(W, 5, 66, 5)).map(|c| c.id),
        Some(claim.id)
    );
    assert_eq!(h.service.region(&Bounds::new(W, (-5, 0, -5), (1, 100, 1))).len(), 1);
}

#[tokio::test]
async fn overlapping_claim_conflicts() {
    let h = harness();
    let first = h
        .service
        .create_claim(request(&h, (0, 64, 0), (10, 70, 10), 1))
        .await
        .unwrap();
    let err = h
        .service
        .create_claim(request(&h, (10, 70, 10), (12, 72, 12), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Overlap(id) if id == first.id));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(h.store.claim_count(), 1);
}

#[tokio::test]
async fn geometry_and_type_are_validated() {
    let h = harness();

    let too_wide = h
        .service
        .create_claim(request(&h, (0, 64, 0), (32, 64, 0), 1))
        .await
        .unwrap_err();
    assert_eq!(too_wide.kind(), ErrorKind::Validation);

    let too_high = h
        .service
        .create_claim(request(&h, (0, 300, 0), (1, 320, 1), 1))
        .await
        .unwrap_err();
    assert_eq!(too_high.kind(), ErrorKind::Validation);

    let unknown = h
        .service
        .create_claim(request(&h, (0, 64, 0), (1, 64, 1), 99))
        .await
        .unwrap_err();
    assert!(matches!(unknown, ServiceError::UnknownReinforcement(99)));

    let mut inverted = request(&h, (0, 64, 0), (1, 64, 1), 1);
    inverted.bounds.min_x = 5;
    let inverted = h.service.create_claim(inverted).await.unwrap_err();
    assert_eq!(inverted.kind(), ErrorKind::Validation);

    assert_eq!(h.store.calls(), 0);
}

#[tokio::test]
async fn creator_must_belong_to_owning_group() {
    let h = harness();
    let mut req = request(&h, (0, 64, 0), (3, 64, 3), 1);
    req.creator = h.bob;
    let err = h.service.create_claim(req).await.unwrap_err();
    assert!(matches!(err, ServiceError::Denied(DenyReason::NotAuthorized)));

    h.registry.set_available(false);
    let err = h
        .service
        .create_claim(request(&h, (0, 64, 0), (3, 64, 3), 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert!(h.service.index().is_empty());
}

#[tokio::test]
async fn transient_store_failure_commits_once() {
    let h = harness();
    h.store.fail_next(2, true);
    let claim = h
        .service
        .create_claim(request(&h, (0, 64, 0), (3, 64, 3), 1))
        .await
        .unwrap();
    assert_eq!(h.store.calls(), 3);
    assert_eq!(h.store.claim_count(), 1);
    assert!(h.service.index().get(&claim.id).is_some());
}

/// Store whose first insert commits and then reports a dropped connection,
/// as when the acknowledgement of a committed transaction is lost.
#[derive(Default)]
struct LostAckStore {
    inner: MemoryClaimStore,
    ack_lost: AtomicBool,
}

#[async_trait]
impl ClaimStore for LostAckStore {
    async fn insert_claim(&self, claim: &Claim) -> Result<(), StoreError> {
        self.inner.insert_claim(claim).await?;
        if self.ack_lost.swap(true, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(String::from("connection reset after commit")))
        }
    }

    async fn update_claim(&self, claim: &Claim) -> Result<(), StoreError> {
        self.inner.update_claim(claim).await
    }

    async fn delete_claim(&self, id: ClaimId) -> Result<bool, StoreError> {
        self.inner.delete_claim(id).await
    }

    async fn load_all(&self) -> Result<Vec<Claim>, StoreError> {
        self.inner.load_all().await
    }

    async fn load_chunk(&self, chunk: ChunkPos) -> Result<Vec<Claim>, StoreError> {
        self.inner.load_chunk(chunk).await
    }

    async fn populated_chunks(&self) -> Result<Vec<ChunkPos>, StoreError> {
        self.inner.populated_chunks().await
    }

    async fn append_audit(&self, entries: &[AuditEntry]) -> Result<(), StoreError> {
        self.inner.append_audit(entries).await
    }

    async fn audit_for_claim(
        &self,
        id: ClaimId,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, StoreError> {
        self.inner.audit_for_claim(id, limit).await
    }
}

#[tokio::test]
async fn insert_committed_before_lost_ack_is_indexed() {
    let config = test_config();
    let store = Arc::new(LostAckStore::default());
    let registry = Arc::new(InMemoryGroupRegistry::new());
    let owners = GroupId::new();
    let rivals = GroupId::new();
    let alice = PlayerId::new();
    let mallory = PlayerId::new();
    registry.set_members(owners, [alice]);
    registry.set_members(rivals, [mallory]);

    let index = SharedClaimIndex::default();
    let access = AccessController::new(
        index.clone(),
        Arc::clone(&registry) as Arc<dyn GroupRegistry>,
        AccessPolicy::default(),
    );
    let service = ClaimService::new(
        index,
        Arc::clone(&store) as Arc<dyn ClaimStore>,
        access,
        &config,
    );

    let bounds = Bounds::new(W, (0, 64, 0), (3, 64, 3));
    let claim = service
        .create_claim(NewClaim {
            group_id: owners,
            creator: alice,
            bounds,
            reinforcement_type: 1,
        })
        .await
        .unwrap();

    assert_eq!(store.inner.calls(), 2);
    assert_eq!(store.inner.claim_count(), 1);
    assert_eq!(store.inner.stored(claim.id), Some(claim.clone()));
    assert_eq!(
        service.lookup(&BlockPos::new(W, 1, 64, 1)).map(|c| c.id),
        Some(claim.id)
    );

    let err = service
        .create_claim(NewClaim {
            group_id: rivals,
            creator: mallory,
            bounds,
            reinforcement_type: 1,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Overlap(id) if id == claim.id));
    assert_eq!(store.inner.claim_count(), 1);
}

#[tokio::test]
async fn permanent_store_failure_leaves_index_untouched() {
    let h = harness();
    h.store.fail_next(1, false);
    let err = h
        .service
        .create_claim(request(&h, (0, 64, 0), (3, 64, 3), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Store(StoreError::Corrupt(_))));
    assert_eq!(err.kind(), ErrorKind::Storage { transient: false });
    assert_eq!(h.store.calls(), 1);
    assert!(h.service.index().is_empty());
}

#[tokio::test]
async fn exhausted_retries_leave_index_untouched() {
    let h = harness();
    let claim = h
        .service
        .create_claim(request(&h, (0, 64, 0), (3, 64, 3), 1))
        .await
        .unwrap();

    h.store.fail_next(10, true);
    let err = h
        .service
        .set_access(
            claim.id,
            h.alice,
            AccessSubject::Player(h.bob),
            PermissionSet::ALL,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Store(StoreError::RetryExhausted { .. })));
    let indexed = h.service.get(claim.id).unwrap();
    assert!(indexed.record_for(&AccessSubject::Player(h.bob)).is_none());
}

#[tokio::test]
async fn access_edits_require_manage_and_protect_owner() {
    let h = harness();
    let claim = h
        .service
        .create_claim(request(&h, (0, 64, 0), (3, 64, 3), 1))
        .await
        .unwrap();
    let inside = BlockPos::new(W, 1, 64, 1);

    let denied = h
        .service
        .set_access(
            claim.id,
            h.bob,
            AccessSubject::Player(h.bob),
            PermissionSet::ALL,
        )
        .await
        .unwrap_err();
    assert_eq!(denied.kind(), ErrorKind::Unauthorized);

    h.service
        .set_access(
            claim.id,
            h.alice,
            AccessSubject::Player(h.bob),
            PermissionSet::NONE.with(Permission::Build, true),
        )
        .await
        .unwrap();
    let verdict = h.service.access().check(h.bob, Action::Place, inside).await;
    assert_eq!(verdict.decision, Decision::Allow);
    let verdict = h.service.access().check(h.bob, Action::UseDoor, inside).await;
    assert_eq!(verdict.decision, Decision::Deny(DenyReason::NotAuthorized));

    let updated = h
        .service
        .revoke_access(claim.id, h.alice, AccessSubject::Player(h.bob))
        .await
        .unwrap();
    assert!(updated.record_for(&AccessSubject::Player(h.bob)).is_none());
    assert_eq!(h.store.stored(claim.id).unwrap().access.len(), 1);

    let owner = h
        .service
        .revoke_access(claim.id, h.alice, AccessSubject::Group(h.owners))
        .await
        .unwrap_err();
    assert_eq!(owner.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn reinforce_restores_health_and_refreshes() {
    let h = harness();
    let claim = h
        .service
        .create_claim(request(&h, (0, 64, 0), (3, 64, 3), 1))
        .await
        .unwrap();
    h.service.damage_claim(claim.id, 10).await.unwrap();

    let denied = h.service.reinforce(claim.id, h.bob, 2).await.unwrap_err();
    assert_eq!(denied.kind(), ErrorKind::Unauthorized);

    let reinforced = h.service.reinforce(claim.id, h.alice, 2).await.unwrap();
    assert_eq!(reinforced.reinforcement.type_id, 2);
    assert_eq!(reinforced.reinforcement.health, 250);
    assert!(reinforced.refreshed_at >= claim.refreshed_at);
    assert_eq!(h.store.stored(claim.id), Some(reinforced));
}

#[tokio::test]
async fn remove_claim_clears_every_coordinate() {
    let mut h = harness();
    let claim = h
        .service
        .create_claim(request(&h, (-3, 64, -3), (3, 66, 3), 1))
        .await
        .unwrap();

    let denied = h.service.remove_claim(claim.id, h.bob).await.unwrap_err();
    assert_eq!(denied.kind(), ErrorKind::Unauthorized);
    let audited = h.audit.try_recv().unwrap();
    assert_eq!(audited.action, Action::RemoveClaim);

    h.service.remove_claim(claim.id, h.alice).await.unwrap();
    for x in -3..=3 {
        for y in 64..=66 {
            for z in -3..=3 {
                assert!(h.service.lookup(&BlockPos::new(W, x, y, z)).is_none());
            }
        }
    }
    assert_eq!(h.store.claim_count(), 0);
    assert_eq!(
        h.service.get(claim.id).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn damage_wears_down_then_destroys() {
    let h = harness();
    let claim = h
        .service
        .create_claim(request(&h, (0, 64, 0), (3, 64, 3), 1))
        .await
        .unwrap();

    assert_eq!(
        h.service.damage_claim(claim.id, 10).await.unwrap(),
        DamageOutcome::Damaged { remaining: 15 }
    );
    assert_eq!(h.store.stored(claim.id).unwrap().reinforcement.health, 15);
    assert_eq!(
        h.service.damage_claim(claim.id, 15).await.unwrap(),
        DamageOutcome::Destroyed
    );
    assert!(h.service.index().is_empty());
    assert_eq!(
        h.service.damage_claim(claim.id, 1).await.unwrap(),
        DamageOutcome::Missing
    );
}

#[tokio::test]
async fn immature_claims_take_multiplied_damage() {
    let h = harness();
    let claim = h
        .service
        .create_claim(request(&h, (0, 64, 0), (3, 64, 3), 2))
        .await
        .unwrap();
    assert_eq!(
        h.service.damage_claim(claim.id, 10).await.unwrap(),
        DamageOutcome::Damaged { remaining: 230 }
    );
}

#[tokio::test]
async fn decay_sweep_evicts_stale_claims() {
    let mut config = test_config();
    config.claims.decay_duration_secs = 60;
    let h = harness_with(&config, Arc::new(MemoryClaimStore::new()));
    let claim = h
        .service
        .create_claim(request(&h, (0, 64, 0), (3, 64, 3), 1))
        .await
        .unwrap();

    assert!(h.service.sweep_decay(Utc::now()).await.is_empty());
    let later = Utc::now() + Duration::seconds(120);
    assert_eq!(h.service.sweep_decay(later).await, vec![claim.id]);
    assert!(h.service.index().is_empty());
    assert_eq!(h.store.claim_count(), 0);
}

#[tokio::test]
async fn zero_decay_duration_disables_sweep() {
    let mut config = test_config();
    config.claims.decay_duration_secs = 0;
    let h = harness_with(&config, Arc::new(MemoryClaimStore::new()));
    h.service
        .create_claim(request(&h, (0, 64, 0), (3, 64, 3), 1))
        .await
        .unwrap();
    let far_future = Utc::now() + Duration::days(10_000);
    assert!(h.service.sweep_decay(far_future).await.is_empty());
    assert_eq!(h.service.index().len(), 1);
}

#[tokio::test]
async fn evict_skips_permission_checks() {
    let h = harness();
    let claim = h
        .service
        .create_claim(request(&h, (0, 64, 0), (3, 64, 3), 1))
        .await
        .unwrap();
    h.service.evict(claim.id, EvictionCause::Destroyed).await.unwrap();
    assert!(h.service.index().is_empty());
}

#[tokio::test]
async fn warm_and_chunk_loads_restore_index() {
    let config = test_config();
    let store = Arc::new(MemoryClaimStore::new());
    let original = harness_with(&config, Arc::clone(&store));
    let near = original
        .service
        .create_claim(request(&original, (0, 64, 0), (3, 64, 3), 1))
        .await
        .unwrap();
    let far = original
        .service
        .create_claim(request(&original, (100, 64, 100), (103, 64, 103), 1))
        .await
        .unwrap();

    let restarted = harness_with(&config, Arc::clone(&store));
    let loaded = restarted
        .service
        .load_chunk(ChunkPos::new(W, 0, 0))
        .await
        .unwrap();
    assert_eq!(loaded, 1);
    assert!(restarted.service.index().get(&near.id).is_some());
    assert!(restarted.service.index().get(&far.id).is_none());

    let chunks = restarted.service.populated_chunks().await.unwrap();
    assert_eq!(
        chunks,
        vec![ChunkPos::new(W, 0, 0), ChunkPos::new(W, 6, 6)]
    );

    let warmed = restarted.service.warm().await;
    assert!(warmed.is_ok());
    assert_eq!(restarted.service.index().len(), 2);
}

#[tokio::test]
async fn insecure_toggle_requires_manage_and_survives_reinforce() {
    let h = harness();
    let claim = h
        .service
        .create_claim(request(&h, (0, 64, 0), (3, 64, 3), 1))
        .await
        .unwrap();
    assert!(!claim.reinforcement.insecure);

    let err = h
        .service
        .set_insecure(claim.id, h.bob, true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let calls = h.store.calls();
    let opened = h.service.set_insecure(claim.id, h.alice, true).await.unwrap();
    assert!(opened.reinforcement.insecure);
    assert!(h.store.stored(claim.id).unwrap().reinforcement.insecure);
    assert_eq!(h.store.calls(), calls + 1);

    h.service.set_insecure(claim.id, h.alice, true).await.unwrap();
    assert_eq!(h.store.calls(), calls + 1);

    let reinforced = h.service.reinforce(claim.id, h.alice, 2).await.unwrap();
    assert!(reinforced.reinforcement.insecure);
    assert_eq!(reinforced.reinforcement.health, 250);

    let closed = h.service.set_insecure(claim.id, h.alice, false).await.unwrap();
    assert!(!closed.reinforcement.insecure);
    assert!(!h.service.get(claim.id).unwrap().reinforcement.insecure);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overlapping_creates_admit_one() {
    let h = harness();
    let mut tasks = Vec::new();
    for offset in 0..8 {
        let service = Arc::clone(&h.service);
        let req = request(&h, (offset, 64, offset), (offset + 8, 64, offset + 8), 1);
        tasks.push(tokio::spawn(async move { service.create_claim(req).await }));
    }

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(err) => assert_eq!(err.kind(), ErrorKind::Conflict),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(h.store.claim_count(), 1);
}
