//! Access decisions.
//!
//! The controller resolves the claim at a position, gathers the actor's
//! relevant group memberships, and hands the snapshot to [`evaluate`], a
//! pure function. Precedence mirrors route access lists: an explicit player
//! record decides on its own, then any group record whose group contains
//! the actor and whose flags include the required permission allows,
//! otherwise the actor is denied.
//!
//! Registry failures never turn into an allow.

use std::collections::BTreeMap;
use std::sync::Arc;

use citadel_index::SharedClaimIndex;
use citadel_types::{
    AccessSubject, Action, BlockPos, Claim, ClaimId, Decision, DefaultPolicy, DenyReason,
    GroupId, PlayerId,
};

use crate::audit::{AuditSink, entry_for_decision};
use crate::error::RegistryError;
use crate::registry::GroupRegistry;

/// Policy knobs for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccessPolicy {
    /// Decision for positions no claim covers.
    pub default_policy: DefaultPolicy,
    /// Whether checks on unclaimed positions are audited.
    pub audit_unclaimed: bool,
}

/// The outcome of a check, with the claim it was made against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Allow or deny with a reason.
    pub decision: Decision,
    /// The claim covering the position, if any.
    pub claim_id: Option<ClaimId>,
}

/// Decides whether actors may act at positions.
#[derive(Clone)]
pub struct AccessController {
    index: SharedClaimIndex,
    registry: Arc<dyn GroupRegistry>,
    policy: AccessPolicy,
    audit: Option<AuditSink>,
}

impl std::fmt::Debug for AccessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessController")
            .field("policy", &self.policy)
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl AccessController {
    /// Create a controller over `index`, resolving groups via `registry`.
    pub const fn new(
        index: SharedClaimIndex,
        registry: Arc<dyn GroupRegistry>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            index,
            registry,
            policy,
            audit: None,
        }
    }

    /// Attach an audit sink. Every completed check is recorded to it.
    #[must_use]
    pub fn with_audit(mut self, sink: AuditSink) -> Self {
        self.audit = Some(sink);
        self
    }

    /// The attached audit sink, if any.
    pub const fn audit_sink(&self) -> Option<&AuditSink> {
        self.audit.as_ref()
    }

    /// The active policy.
    pub const fn policy(&self) -> AccessPolicy {
        self.policy
    }

    /// The group registry used for membership.
    pub const fn registry(&self) -> &Arc<dyn GroupRegistry> {
        &self.registry
    }

    /// Decide whether `actor` may perform `action` at `pos`, and audit it.
    pub async fn check(&self, actor: PlayerId, action: Action, pos: BlockPos) -> Verdict {
        let Some(claim) = self.index.claim_at(&pos) else {
            let decision = match self.policy.default_policy {
                DefaultPolicy::Allow => Decision::Allow,
                DefaultPolicy::Deny => Decision::Deny(DenyReason::DefaultPolicy),
            };
            if self.policy.audit_unclaimed {
                self.record(actor, action, None, pos, &decision);
            }
            return Verdict {
                decision,
                claim_id: None,
            };
        };

        let decision = self.decide_on_claim(&claim, actor, action).await;
        self.record(actor, action, Some(claim.id), pos, &decision);
        Verdict {
            decision,
            claim_id: Some(claim.id),
        }
    }

    /// Decide against a known claim without touching the index or audit.
    pub async fn decide_on_claim(
        &self,
        claim: &Claim,
        actor: PlayerId,
        action: Action,
    ) -> Decision {
        if claim.record_for(&AccessSubject::Player(actor)).is_some() {
            return evaluate(claim, actor, action, &BTreeMap::new());
        }
        match resolve_memberships(self.registry.as_ref(), claim, actor, action).await {
            Ok(memberships) => evaluate(claim, actor, action, &memberships),
            Err(err) => {
                tracing::warn!(
                    claim = %claim.id,
                    actor = %actor,
                    error = %err,
                    "group lookup failed, denying"
                );
                Decision::Deny(err.deny_reason())
            }
        }
    }

    fn record(
        &self,
        actor: PlayerId,
        action: Action,
        claim_id: Option<ClaimId>,
        pos: BlockPos,
        decision: &Decision,
    ) {
        if let Some(sink) = &self.audit {
            sink.record(entry_for_decision(actor, action, claim_id, pos, decision));
        }
    }
}

/// Resolve the actor's membership in every group whose record on `claim`
/// would grant `action`. Stops at the first group that contains the actor.
///
/// An unknown group other than the owner counts as having no members. An
/// unknown owner group, or any unavailability, is an error.
async fn resolve_memberships(
    registry: &dyn GroupRegistry,
    claim: &Claim,
    actor: PlayerId,
    action: Action,
) -> Result<BTreeMap<GroupId, bool>, RegistryError> {
    let needed = action.required_permission();
    let mut memberships = BTreeMap::new();
    for group in claim.referenced_groups() {
        let grants = claim
            .record_for(&AccessSubject::Group(group))
            .is_some_and(|r| r.permissions.allows(needed));
        if !grants {
            continue;
        }
        let member = match registry.is_member(group, actor).await {
            Ok(member) => member,
            Err(RegistryError::GroupNotFound(_)) if group != claim.group_id => false,
            Err(err) => return Err(err),
        };
        memberships.insert(group, member);
        if member {
            break;
        }
    }
    Ok(memberships)
}

/// The pure decision function.
///
/// `memberships` maps group IDs to whether `actor` is a member; groups
/// missing from the map count as non-membership.
pub fn evaluate(
    claim: &Claim,
    actor: PlayerId,
    action: Action,
    memberships: &BTreeMap<GroupId, bool>,
) -> Decision {
    let needed = action.required_permission();

    if let Some(record) = claim.record_for(&AccessSubject::Player(actor)) {
        return if record.permissions.allows(needed) {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::NotAuthorized)
        };
    }

    let granted = claim.access.iter().any(|record| match record.subject {
        AccessSubject::Group(group) => {
            record.permissions.allows(needed) && memberships.get(&group).copied().unwrap_or(false)
        }
        AccessSubject::Player(_) => false,
    });

    if granted {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::NotAuthorized)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use citadel_index::ClaimIndex;
    use citadel_types::{
        AccessRecord, AuditOutcome, Bounds, PermissionSet, Permission, Reinforcement, WorldId,
    };

    use super::*;
    use crate::registry::InMemoryGroupRegistry;

    const W: WorldId = WorldId(0);

    struct Fixture {
        controller: AccessController,
        registry: Arc<InMemoryGroupRegistry>,
        owners: GroupId,
        alice: PlayerId,
        bob: PlayerId,
        claim_id: ClaimId,
    }

    fn owned_claim(owners: GroupId) -> Claim {
        Claim {
            id: ClaimId::new(),
            group_id: owners,
            bounds: Bounds::new(W, (0, 64, 0), (15, 80, 15)),
            created_at: Utc::now(),
            refreshed_at: Utc::now(),
            reinforcement: Reinforcement {
                type_id: 1,
                health: 25,
                insecure: false,
            },
            access: vec![AccessRecord {
                subject: AccessSubject::Group(owners),
                permissions: PermissionSet::ALL,
            }],
        }
    }

    fn fixture(policy: AccessPolicy) -> Fixture {
        let registry = Arc::new(InMemoryGroupRegistry::new());
        let owners = GroupId::new();
        let alice = PlayerId::new();
        let bob = PlayerId::new();
        registry.set_members(owners, [alice]);

        let claim = owned_claim(owners);
        let claim_id = claim.id;
        let mut index = ClaimIndex::new();
        index.insert(claim).unwrap();

        let controller = AccessController::new(
            SharedClaimIndex::new(index),
            Arc::clone(&registry) as Arc<dyn GroupRegistry>,
            policy,
        );
        Fixture {
            controller,
            registry,
            owners,
            alice,
            bob,
            claim_id,
        }
    }

    fn inside() -> BlockPos {
        BlockPos::new(W, 5, 70, 5)
    }

    #[tokio::test]
    async fn owner_member_may_break_outsider_may_not() {
        let f = fixture(AccessPolicy::default());

        let verdict = f.controller.check(f.alice, Action::Break, inside()).await;
        assert_eq!(verdict.decision, Decision::Allow);
        assert_eq!(verdict.claim_id, Some(f.claim_id));

        let verdict = f.controller.check(f.bob, Action::Break, inside()).await;
        assert_eq!(verdict.decision, Decision::Deny(DenyReason::NotAuthorized));
    }

    #[tokio::test]
    async fn unclaimed_follows_default_policy() {
        let open = fixture(AccessPolicy::default());
        let outside = BlockPos::new(W, 100, 70, 100);
        let verdict = open.controller.check(open.bob, Action::Place, outside).await;
        assert_eq!(verdict.decision, Decision::Allow);
        assert!(verdict.claim_id.is_none());

        let closed = fixture(AccessPolicy {
            default_policy: DefaultPolicy::Deny,
            audit_unclaimed: false,
        });
        let verdict = closed.controller.check(closed.bob, Action::Place, outside).await;
        assert_eq!(verdict.decision, Decision::Deny(DenyReason::DefaultPolicy));
    }

    #[tokio::test]
    async fn registry_outage_fails_closed() {
        let f = fixture(AccessPolicy::default());
        f.registry.set_available(false);
        let verdict = f.controller.check(f.alice, Action::Break, inside()).await;
        assert_eq!(
            verdict.decision,
            Decision::Deny(DenyReason::RegistryUnavailable)
        );
    }

    #[tokio::test]
    async fn unknown_owner_group_denies_with_group_not_found() {
        let f = fixture(AccessPolicy::default());
        f.registry.remove_group(f.owners);
        let verdict = f.controller.check(f.alice, Action::Break, inside()).await;
        assert_eq!(verdict.decision, Decision::Deny(DenyReason::GroupNotFound));
    }

    #[tokio::test]
    async fn player_record_decides_without_registry() {
        let f = fixture(AccessPolicy::default());
        let mut claim = f.controller.index.get(&f.claim_id).unwrap();
        claim.upsert_record(AccessRecord {
            subject: AccessSubject::Player(f.bob),
            permissions: PermissionSet::NONE.with(Permission::Door, true),
        });
        f.registry.set_available(false);

        assert_eq!(
            f.controller.decide_on_claim(&claim, f.bob, Action::UseDoor).await,
            Decision::Allow
        );
        assert_eq!(
            f.controller.decide_on_claim(&claim, f.bob, Action::Break).await,
            Decision::Deny(DenyReason::NotAuthorized)
        );
    }

    #[tokio::test]
    async fn checks_are_audited() {
        let (sink, mut rx) = AuditSink::channel(8);
        let f = fixture(AccessPolicy::default());
        let controller = f.controller.clone().with_audit(sink);

        controller.check(f.bob, Action::Break, inside()).await;
        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.outcome, AuditOutcome::Denied);
        assert_eq!(entry.claim_id, Some(f.claim_id));
        assert_eq!(entry.reason.as_deref(), Some("not authorized"));

        controller
            .check(f.bob, Action::Break, BlockPos::new(W, 500, 0, 500))
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unclaimed_checks_audited_when_enabled() {
        let (sink, mut rx) = AuditSink::channel(8);
        let f = fixture(AccessPolicy {
            default_policy: DefaultPolicy::Allow,
            audit_unclaimed: true,
        });
        let controller = f.controller.clone().with_audit(sink);
        controller
            .check(f.bob, Action::Place, BlockPos::new(W, 500, 0, 500))
            .await;
        let entry = rx.try_recv().unwrap();
        assert_eq!(entry.outcome, AuditOutcome::Allowed);
        assert!(entry.claim_id.is_none());
    }

    #[test]
    fn evaluate_is_deterministic() {
        let owners = GroupId::new();
        let friends = GroupId::new();
        let actor = PlayerId::new();
        let mut claim = owned_claim(owners);
        claim.upsert_record(AccessRecord {
            subject: AccessSubject::Group(friends),
            permissions: PermissionSet::NONE.with(Permission::Container, true),
        });
        let memberships = BTreeMap::from([(owners, false), (friends, true)]);

        let first = evaluate(&claim, actor, Action::OpenContainer, &memberships);
        for _ in 0..32 {
            assert_eq!(
                evaluate(&claim, actor, Action::OpenContainer, &memberships),
                first
            );
        }
        assert_eq!(first, Decision::Allow);
        assert_eq!(
            evaluate(&claim, actor, Action::Break, &memberships),
            Decision::Deny(DenyReason::NotAuthorized)
        );
    }

    #[test]
    fn explicit_player_refusal_overrides_group_grant() {
        let owners = GroupId::new();
        let actor = PlayerId::new();
        let mut claim = owned_claim(owners);
        claim.upsert_record(AccessRecord {
            subject: AccessSubject::Player(actor),
            permissions: PermissionSet::NONE,
        });
        let memberships = BTreeMap::from([(owners, true)]);
        assert_eq!(
            evaluate(&claim, actor, Action::Place, &memberships),
            Decision::Deny(DenyReason::NotAuthorized)
        );
    }
}
